//! Local play queue.
//!
//! Holds song ids only; the catalog stays the source of truth for song data.
//! Played entries are kept so `previous` can step back through history.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayQueue {
    /// History; the last entry is the current song.
    played: Vec<String>,
    queued: VecDeque<String>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append songs after everything already queued.
    pub fn enqueue<I>(&mut self, song_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.queued.extend(song_ids);
    }

    /// Insert a song directly after the current one.
    pub fn play_next(&mut self, song_id: impl Into<String>) {
        self.queued.push_front(song_id.into());
    }

    pub fn current(&self) -> Option<&str> {
        self.played.last().map(String::as_str)
    }

    /// Move to the next queued song. At the end of the queue the current
    /// song stays current.
    pub fn advance(&mut self) -> Option<&str> {
        if let Some(song_id) = self.queued.pop_front() {
            self.played.push(song_id);
        }
        self.current()
    }

    /// Step back one song; the current song returns to the head of the queue.
    pub fn previous(&mut self) -> Option<&str> {
        if let Some(song_id) = self.played.pop() {
            self.queued.push_front(song_id);
        }
        self.current()
    }

    /// Drop every occurrence of the given songs from history and queue.
    pub fn remove(&mut self, song_ids: &[String]) {
        let doomed: HashSet<&str> = song_ids.iter().map(String::as_str).collect();
        self.played.retain(|id| !doomed.contains(id.as_str()));
        self.queued.retain(|id| !doomed.contains(id.as_str()));
    }

    /// Keep only songs still present in the catalog.
    pub fn retain_known(&mut self, known: &HashSet<String>) -> usize {
        let before = self.len();
        self.played.retain(|id| known.contains(id));
        self.queued.retain(|id| known.contains(id));
        before - self.len()
    }

    pub fn clear(&mut self) {
        self.played.clear();
        self.queued.clear();
    }

    /// Songs still waiting to play, in order.
    pub fn upcoming(&self) -> impl Iterator<Item = &str> {
        self.queued.iter().map(String::as_str)
    }

    /// History followed by the upcoming songs.
    pub fn song_ids(&self) -> Vec<String> {
        self.played.iter().chain(self.queued.iter()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.played.len() + self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.played.is_empty() && self.queued.is_empty()
    }
}
