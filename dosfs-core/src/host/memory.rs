//! In-memory host directory tree.

use super::{dot_entries, segments, HostDirIter, HostDirectory, HostEntry};

/// Simple in-memory host tree. Entries enumerate in insertion order.
#[derive(Debug, Default, Clone)]
pub struct MemoryHostDirectory {
    root: MemDir,
}

#[derive(Debug, Default, Clone)]
struct MemDir {
    entries: Vec<MemEntry>,
}

#[derive(Debug, Clone)]
struct MemEntry {
    name: String,
    short_hint: Option<String>,
    dir: Option<MemDir>,
}

impl MemDir {
    fn child(&self, name: &str) -> Option<&MemEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn child_dir_mut(&mut self, name: &str) -> &mut MemDir {
        let idx = match self.entries.iter().position(|e| e.name == name) {
            Some(idx) => idx,
            None => {
                self.entries.push(MemEntry {
                    name: name.to_string(),
                    short_hint: None,
                    dir: Some(MemDir::default()),
                });
                self.entries.len() - 1
            }
        };
        self.entries[idx].dir.get_or_insert_with(MemDir::default)
    }
}

impl MemoryHostDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with initial files (directories in the paths are created).
    pub fn with_files<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut host = Self::new();
        for path in paths {
            host.add_file(path.as_ref());
        }
        host
    }

    /// Add a directory, creating missing parents.
    pub fn add_dir(&mut self, path: &str) {
        let mut dir = &mut self.root;
        for segment in segments(path) {
            dir = dir.child_dir_mut(segment);
        }
    }

    /// Add a file, creating missing parents.
    pub fn add_file(&mut self, path: &str) {
        self.insert_file(path, None);
    }

    /// Add a file the host already knows a short name for.
    pub fn add_file_with_hint(&mut self, path: &str, short_hint: &str) {
        self.insert_file(path, Some(short_hint.to_string()));
    }

    fn insert_file(&mut self, path: &str, short_hint: Option<String>) {
        let parts: Vec<&str> = segments(path).collect();
        let Some((name, parents)) = parts.split_last() else {
            return;
        };
        let mut dir = &mut self.root;
        for segment in parents {
            dir = dir.child_dir_mut(segment);
        }
        if dir.child(name).is_none() {
            dir.entries.push(MemEntry {
                name: name.to_string(),
                short_hint,
                dir: None,
            });
        }
    }

    /// Remove a file or directory (with its contents).
    pub fn remove(&mut self, path: &str) -> bool {
        let parts: Vec<&str> = segments(path).collect();
        let Some((name, parents)) = parts.split_last() else {
            return false;
        };
        let mut dir = &mut self.root;
        for segment in parents {
            match dir.entries.iter_mut().find(|e| e.name == *segment) {
                Some(MemEntry { dir: Some(sub), .. }) => dir = sub,
                _ => return false,
            }
        }
        let before = dir.entries.len();
        dir.entries.retain(|e| e.name != *name);
        dir.entries.len() != before
    }

    fn find_dir(&self, path: &str) -> Option<&MemDir> {
        let mut dir = &self.root;
        for segment in segments(path) {
            dir = dir.child(segment)?.dir.as_ref()?;
        }
        Some(dir)
    }
}

impl HostDirectory for MemoryHostDirectory {
    fn open(&self, path: &str) -> Option<HostDirIter<'_>> {
        let dir = self.find_dir(path)?;
        let dots = if segments(path).next().is_some() {
            dot_entries().to_vec()
        } else {
            Vec::new()
        };
        let entries = dir.entries.iter().map(|e| HostEntry {
            name: e.name.clone(),
            short_hint: e.short_hint.clone(),
            is_dir: e.dir.is_some(),
        });
        Some(Box::new(dots.into_iter().chain(entries)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(host: &MemoryHostDirectory, path: &str) -> Vec<String> {
        host.open(path).unwrap().map(|e| e.name).collect()
    }

    #[test]
    fn test_insertion_order_and_parents() {
        let host = MemoryHostDirectory::with_files(["zeta.txt", "docs/readme.md", "alpha.txt"]);
        assert_eq!(names(&host, ""), vec!["zeta.txt", "docs", "alpha.txt"]);
        assert_eq!(names(&host, "docs"), vec![".", "..", "readme.md"]);
        assert!(host.open("missing").is_none());
        assert!(host.open("zeta.txt").is_none());
    }

    #[test]
    fn test_remove() {
        let mut host = MemoryHostDirectory::with_files(["a/b/c.txt", "a/d.txt"]);
        assert!(host.remove("a/b"));
        assert_eq!(names(&host, "a"), vec![".", "..", "d.txt"]);
        assert!(!host.remove("a/b"));
    }
}
