use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

pub const HIDDEN_MARKER: char = '.';

/// One file or directory below the media root.
///
/// `path` is relative to the root and `/`-separated. Two entries are the same
/// entry when their paths are equal, whatever `is_dir` says.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entry {
    pub path: String,
    pub is_dir: bool,
}

impl Entry {
    pub fn new(path: impl Into<String>, is_dir: bool) -> Self {
        let mut path = path.into();
        if path.starts_with('/') {
            path = path.trim_start_matches('/').to_string();
        }
        Self { path, is_dir }
    }

    pub fn track(path: impl Into<String>) -> Self {
        Self::new(path, false)
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self::new(path, true)
    }

    pub fn is_track(&self) -> bool {
        !self.is_dir
    }

    pub fn name(&self) -> &str {
        entry_name(&self.path)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

pub fn is_hidden(entry: &Entry) -> bool {
    is_hidden_name(entry.name())
}

pub fn is_hidden_name(name: &str) -> bool {
    entry_name(name).starts_with(HIDDEN_MARKER)
}

fn entry_name(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

/// Joins a `/`-separated relpath onto `root`, refusing anything that could
/// leave `root`.
pub fn join_relpath_checked(root: &Path, relpath: &str) -> Option<PathBuf> {
    let mut out = PathBuf::from(root);
    for part in relpath.split(['/', '\\']) {
        if part.is_empty() || part == "." {
            continue;
        }
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => out.push(part),
            _ => return None,
        }
    }
    Some(out)
}

/// Joins a directory relpath and a child name with `/`.
pub fn child_relpath(parent: &str, name: &str) -> String {
    let parent = parent.trim_matches('/');
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}
