//! Ordered, deduplicated list of directories searched for shared mod code.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

/// Code search path. Earlier entries take priority.
#[derive(Debug, Default)]
pub struct CodeSearchPath {
    entries: RwLock<Vec<PathBuf>>,
}

impl CodeSearchPath {
    pub fn new<I>(initial: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut entries: Vec<PathBuf> = Vec::new();
        for path in initial {
            if !entries.contains(&path) {
                entries.push(path);
            }
        }
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Put `path` first, moving it if already present.
    pub fn prepend(&self, path: &Path) {
        let mut entries = self.entries.write();
        entries.retain(|p| p != path);
        entries.insert(0, path.to_path_buf());
        debug!(path = %path.display(), "Code search path entry added");
    }

    /// Remove `path`. Returns false if it was not present.
    pub fn remove(&self, path: &Path) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|p| p != path);
        let removed = entries.len() != before;
        if removed {
            debug!(path = %path.display(), "Code search path entry removed");
        }
        removed
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.read().iter().any(|p| p == path)
    }

    pub fn entries(&self) -> Vec<PathBuf> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// First `<entry>/<name>` that exists on disk.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.join(name))
            .find(|candidate| candidate.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_entries_deduplicated() {
        let sp = CodeSearchPath::new(vec![
            PathBuf::from("/a"),
            PathBuf::from("/b"),
            PathBuf::from("/a"),
        ]);
        assert_eq!(sp.entries(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_prepend_moves_existing_entry_first() {
        let sp = CodeSearchPath::new(vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        sp.prepend(Path::new("/b"));
        sp.prepend(Path::new("/c"));
        assert_eq!(
            sp.entries(),
            vec![PathBuf::from("/c"), PathBuf::from("/b"), PathBuf::from("/a")]
        );
        assert!(sp.remove(Path::new("/b")));
        assert!(!sp.remove(Path::new("/b")));
        assert_eq!(sp.len(), 2);
    }

    #[test]
    fn test_resolve_prefers_earlier_entries() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::create_dir(second.path().join("shared")).unwrap();

        let sp = CodeSearchPath::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(sp.resolve("shared"), Some(second.path().join("shared")));

        std::fs::create_dir(first.path().join("shared")).unwrap();
        assert_eq!(sp.resolve("shared"), Some(first.path().join("shared")));
        assert_eq!(sp.resolve("missing"), None);
    }
}
