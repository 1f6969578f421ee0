//! Host directories backed by `std::fs`.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use super::{dot_entries, segments, HostDirIter, HostDirectory, HostEntry, NameTranslator, Utf8Names};

/// Enumerates a real directory tree rooted at `root`.
pub struct LocalHostDirectory {
    root: PathBuf,
    names: Box<dyn NameTranslator>,
}

impl LocalHostDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_names(root, Utf8Names)
    }

    pub fn with_names(root: impl Into<PathBuf>, names: impl NameTranslator + 'static) -> Self {
        Self {
            root: root.into(),
            names: Box::new(names),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a relative long-name path. None if a segment is not
    /// representable on the host.
    pub fn host_path(&self, rel: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for segment in segments(rel) {
            path.push(self.names.to_host(segment)?);
        }
        Some(path)
    }
}

impl HostDirectory for LocalHostDirectory {
    fn open(&self, path: &str) -> Option<HostDirIter<'_>> {
        let host = self.host_path(path)?;
        let reader = fs::read_dir(&host).ok()?;

        let mut entries: Vec<HostEntry> = Vec::new();
        for dirent in reader.flatten() {
            let Some(name) = self.names.to_guest(&dirent.file_name()) else {
                debug!("skipping non-representable host name {:?}", dirent.file_name());
                continue;
            };
            // Follow symlinks so a linked directory behaves like a directory.
            let is_dir = fs::metadata(dirent.path())
                .map(|m| m.is_dir())
                .unwrap_or(false);
            entries.push(HostEntry {
                name,
                short_hint: None,
                is_dir,
            });
        }
        // read_dir order is unspecified; keep it stable across re-reads.
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let dots = if segments(path).next().is_some() {
            dot_entries().to_vec()
        } else {
            Vec::new()
        };
        Some(Box::new(dots.into_iter().chain(entries)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerates_sorted_with_dots() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("b.txt"), b"b").unwrap();
        fs::write(tmp.path().join("sub").join("a.txt"), b"a").unwrap();

        let host = LocalHostDirectory::new(tmp.path());
        let root: Vec<HostEntry> = host.open("").unwrap().collect();
        assert_eq!(root, vec![HostEntry::dir("sub")]);

        let names: Vec<String> = host.open("sub").unwrap().map(|e| e.name).collect();
        assert_eq!(names, vec![".", "..", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let host = LocalHostDirectory::new(tmp.path());
        assert!(host.open("nope").is_none());
    }
}
