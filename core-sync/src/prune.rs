//! # Pruning
//!
//! Decides which stored entities of one backend disappeared upstream. Pure
//! functions over the stored catalog and what the pass observed; the caller
//! applies the resulting plan.
//!
//! ## Rules
//!
//! - A song survives when it was observed, or when some container on its
//!   parent chain was skip-approved, failed, or exempted.
//! - A container survives when it was observed or exempted, or when an
//!   ancestor was skip-approved, failed, or exempted. The whole chain between
//!   the candidate and that ancestor survives with it.
//! - Ancestors of anything that survives also survive, so a plan never
//!   leaves dangling parent links.
//!
//! A container that was fully re-listed this pass protects nothing below it:
//! its real children were re-emitted, so anything else under it is gone.

use std::collections::{HashMap, HashSet};

use core_library::{Container, Song};

/// What one pass saw of a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassObservation {
    /// Emitted through the song handler.
    pub found_songs: HashSet<String>,
    /// Unchanged, not re-read.
    pub skipped_songs: HashSet<String>,
    pub failed_songs: HashSet<String>,
    /// Emitted through the container handler.
    pub found_containers: HashSet<String>,
    /// Unchanged, sub-tree not listed.
    pub skipped_containers: HashSet<String>,
    pub failed_containers: HashSet<String>,
}

impl PassObservation {
    pub fn song_observed(&self, id: &str) -> bool {
        self.found_songs.contains(id) || self.skipped_songs.contains(id) || self.failed_songs.contains(id)
    }

    pub fn container_observed(&self, id: &str) -> bool {
        self.found_containers.contains(id)
            || self.skipped_containers.contains(id)
            || self.failed_containers.contains(id)
    }
}

/// Ids to delete. Containers are ordered children first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    pub songs: Vec<String>,
    pub containers: Vec<String>,
}

impl PrunePlan {
    pub fn is_empty(&self) -> bool {
        self.songs.is_empty() && self.containers.is_empty()
    }
}

struct Hierarchy<'a> {
    parents: HashMap<&'a str, Option<&'a str>>,
    shield_roots: HashSet<&'a str>,
    shielded: HashMap<&'a str, bool>,
}

impl<'a> Hierarchy<'a> {
    fn new(containers: &'a [Container], shield_roots: HashSet<&'a str>) -> Self {
        Self {
            parents: containers
                .iter()
                .map(|c| (c.id.as_str(), c.parent_id.as_deref()))
                .collect(),
            shield_roots,
            shielded: HashMap::new(),
        }
    }

    fn parent_of(&self, id: &str) -> Option<&'a str> {
        self.parents.get(id).copied().flatten()
    }

    /// Whether `id` or one of its ancestors is a shield root. Every container
    /// walked on the way gets the same answer.
    fn is_shielded(&mut self, id: &'a str) -> bool {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(id);
        let mut result = false;

        while let Some(current) = cursor {
            if let Some(&known) = self.shielded.get(current) {
                result = known;
                break;
            }
            if !seen.insert(current) {
                break;
            }
            chain.push(current);
            if self.shield_roots.contains(current) {
                result = true;
                break;
            }
            cursor = self.parent_of(current);
        }

        for walked in chain {
            self.shielded.insert(walked, result);
        }
        result
    }

    fn depth(&self, id: &str) -> usize {
        let mut depth = 0;
        let mut cursor = self.parent_of(id);
        while let Some(parent) = cursor {
            depth += 1;
            if depth > self.parents.len() {
                break;
            }
            cursor = self.parent_of(parent);
        }
        depth
    }
}

/// Compute deletions for one backend.
///
/// `songs` and `containers` are everything stored for the backend; `exempt`
/// names containers the caller wants kept regardless of the pass.
pub fn plan_prune<'a>(
    songs: &'a [Song],
    containers: &'a [Container],
    observation: &'a PassObservation,
    exempt: &'a HashSet<String>,
) -> PrunePlan {
    let shield_roots: HashSet<&str> = observation
        .skipped_containers
        .iter()
        .chain(&observation.failed_containers)
        .chain(exempt)
        .map(String::as_str)
        .collect();
    let mut hierarchy = Hierarchy::new(containers, shield_roots);

    let mut doomed_songs = Vec::new();
    let mut anchors: Vec<&'a str> = Vec::new();
    for song in songs {
        let keep = observation.song_observed(&song.id)
            || song
                .parent_container_id
                .as_deref()
                .is_some_and(|parent| hierarchy.is_shielded(parent));
        if keep {
            anchors.extend(song.parent_container_id.as_deref());
        } else {
            doomed_songs.push(song.id.clone());
        }
    }

    let mut doomed: HashSet<&'a str> = HashSet::new();
    for container in containers {
        let id = container.id.as_str();
        let keep = observation.container_observed(id) || exempt.contains(id) || hierarchy.is_shielded(id);
        if keep {
            anchors.extend(hierarchy.parent_of(id));
        } else {
            doomed.insert(id);
        }
    }

    let mut anchored = HashSet::new();
    for anchor in anchors {
        let mut cursor = Some(anchor);
        while let Some(current) = cursor {
            if !anchored.insert(current) {
                break;
            }
            doomed.remove(current);
            cursor = hierarchy.parent_of(current);
        }
    }

    let mut doomed_containers: Vec<(usize, &str)> =
        doomed.into_iter().map(|id| (hierarchy.depth(id), id)).collect();
    doomed_containers.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    doomed_songs.sort();

    PrunePlan {
        songs: doomed_songs,
        containers: doomed_containers
            .into_iter()
            .map(|(_, id)| id.to_string())
            .collect(),
    }
}
