//! Directory walk producing a tree of FLAC files with deep version digests.
//!
//! Only `stat`-level calls happen here; file contents are read later and only
//! for songs the engine approves. A directory's digest covers every FLAC file
//! and sub-directory below it, so it changes whenever anything in the sub-tree
//! is added, removed, resized or touched.

use std::path::{Path, PathBuf};

use bridge_traits::storage::FileSystemAccess;
use futures::future::BoxFuture;
use futures::FutureExt;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

const FLAC_EXTENSION: &str = "flac";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// `/`-separated path below the backend root.
    pub relative: String,
    pub name: String,
    pub size: u64,
    pub modified_at: Option<i64>,
}

impl FileEntry {
    /// Size plus modification time.
    pub fn version(&self) -> String {
        format!("{}-{}", self.size, self.modified_at.unwrap_or_default())
    }

    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirNode {
    pub path: PathBuf,
    pub relative: String,
    pub name: String,
    pub files: Vec<FileEntry>,
    pub children: Vec<DirNode>,
    /// Set when the directory could not be listed.
    pub failure: Option<String>,
    pub digest: String,
}

fn is_flac(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(FLAC_EXTENSION))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

fn digest(files: &[FileEntry], children: &[DirNode]) -> String {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(format!("f\0{}\0{}\n", file.name, file.version()));
    }
    for child in children {
        hasher.update(format!("d\0{}\0{}\n", child.name, child.digest));
    }
    hex::encode(hasher.finalize())
}

/// Walk `path` recursively. Listing failures are recorded on the node, never
/// returned, so one unreadable directory does not hide its siblings.
pub fn walk<'a>(
    fs: &'a dyn FileSystemAccess,
    path: PathBuf,
    relative: String,
    name: String,
) -> BoxFuture<'a, DirNode> {
    async move {
        let mut node = DirNode {
            path: path.clone(),
            relative,
            name,
            files: Vec::new(),
            children: Vec::new(),
            failure: None,
            digest: String::new(),
        };

        let entries = match fs.list_directory(&path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(directory = %node.relative, error = %e, "Could not list directory");
                node.failure = Some(e.to_string());
                return node;
            }
        };

        for entry in entries {
            let entry_name = file_name(&entry);
            if entry_name.is_empty() || entry_name.starts_with('.') {
                continue;
            }
            let metadata = match fs.metadata(&entry).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!(entry = %entry_name, error = %e, "Skipping entry without metadata");
                    continue;
                }
            };

            let entry_relative = join_relative(&node.relative, &entry_name);
            if metadata.is_directory {
                node.children
                    .push(walk(fs, entry, entry_relative, entry_name).await);
            } else if is_flac(&entry) {
                node.files.push(FileEntry {
                    path: entry,
                    relative: entry_relative,
                    name: entry_name,
                    size: metadata.size,
                    modified_at: metadata.modified_at,
                });
            }
        }

        node.files.sort_by(|a, b| a.name.cmp(&b.name));
        node.children.sort_by(|a, b| a.name.cmp(&b.name));
        node.digest = digest(&node.files, &node.children);
        node
    }
    .boxed()
}
