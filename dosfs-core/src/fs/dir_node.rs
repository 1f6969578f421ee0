//! Cached directories and the arena that owns them.

use serde::Serialize;

use super::search::SessionId;
use super::short_name::{is_valid_short_name, synthesize, SyntheticName};
use crate::error::DosResult;

/// Stable handle to a [`DirectoryNode`] in an [`Arena`].
///
/// The generation makes a handle to an evicted node detectably stale even
/// after its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational arena of nodes.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                NodeId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(value)
    }

    /// Drop every value. Handles issued earlier stay stale.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free.push(index as u32);
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One child of a cached directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub long_name: String,
    pub short_name: String,
    /// `~N` number of a synthesized short name, 0 otherwise.
    pub suffix: u32,
    pub is_dir: bool,
    /// Injected by the overlay rather than read from the host.
    pub overlay: bool,
    /// Discovery order within the parent.
    pub ordinal: u64,
    #[serde(skip)]
    pub(crate) child: Option<NodeId>,
}

impl DirectoryEntry {
    pub fn is_dot(&self) -> bool {
        self.long_name == "." || self.long_name == ".."
    }

    /// Name shown to the guest: the long name in LFN mode, else the short one.
    pub fn display_name(&self, lfn: bool) -> &str {
        if lfn {
            &self.long_name
        } else {
            &self.short_name
        }
    }
}

/// A cached DOS directory.
#[derive(Debug)]
pub struct DirectoryNode {
    /// Long-name path relative to the host root, `/` separated.
    pub(crate) host_path: String,
    pub(crate) parent: Option<NodeId>,
    /// Sorted by short name.
    entries: Vec<DirectoryEntry>,
    /// Synthesized names only, sorted by short name.
    synthesized: Vec<SyntheticName>,
    pub(crate) cached_in: bool,
    /// Reserved open-directory session.
    pub(crate) session: Option<SessionId>,
    /// Next entry handed out by the open-directory session.
    pub(crate) cursor: usize,
    next_ordinal: u64,
}

/// `~N` number embedded in a short name, if any.
fn parse_suffix(short: &str) -> u32 {
    short
        .split_once('~')
        .and_then(|(_, tail)| tail.split('.').next())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

impl DirectoryNode {
    pub fn new(host_path: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            host_path: host_path.into(),
            parent,
            entries: Vec::new(),
            synthesized: Vec::new(),
            cached_in: false,
            session: None,
            cursor: 0,
            next_ordinal: 0,
        }
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn synthesized(&self) -> &[SyntheticName] {
        &self.synthesized
    }

    pub fn host_path(&self) -> &str {
        &self.host_path
    }

    pub fn is_cached_in(&self) -> bool {
        self.cached_in
    }

    pub(crate) fn entry_mut(&mut self, idx: usize) -> Option<&mut DirectoryEntry> {
        self.entries.get_mut(idx)
    }

    pub fn find_short(&self, short: &str) -> Option<usize> {
        self.entries
            .binary_search_by(|e| e.short_name.as_str().cmp(short))
            .ok()
    }

    pub fn find_long(&self, long: &str, exact_case: bool) -> Option<usize> {
        self.entries.iter().position(|e| {
            if exact_case {
                e.long_name == long
            } else {
                e.long_name.eq_ignore_ascii_case(long)
            }
        })
    }

    /// Name a new child and insert it. Returns its index in the short-name view.
    pub fn add(
        &mut self,
        long_name: &str,
        short_hint: Option<&str>,
        is_dir: bool,
        overlay: bool,
    ) -> DosResult<usize> {
        let hinted = short_hint
            .map(|h| h.to_ascii_uppercase())
            .filter(|h| is_valid_short_name(h) && self.find_short(h).is_none());
        let (short_name, suffix) = match hinted {
            Some(hint) => {
                let suffix = parse_suffix(&hint);
                (hint, suffix)
            }
            None => {
                let short = synthesize(long_name, &self.synthesized, |s| self.find_short(s).is_some())?;
                (short.name, short.suffix)
            }
        };

        let entry = DirectoryEntry {
            long_name: long_name.to_string(),
            short_name,
            suffix,
            is_dir,
            overlay,
            ordinal: self.next_ordinal,
            child: None,
        };
        self.next_ordinal += 1;
        Ok(self.insert(entry))
    }

    fn insert(&mut self, entry: DirectoryEntry) -> usize {
        let idx = self
            .entries
            .partition_point(|e| e.short_name < entry.short_name);
        if entry.suffix > 0 {
            let pos = self
                .synthesized
                .partition_point(|s| s.short_name < entry.short_name);
            self.synthesized.insert(
                pos,
                SyntheticName {
                    short_name: entry.short_name.clone(),
                    suffix: entry.suffix,
                },
            );
        }
        self.entries.insert(idx, entry);
        // Keep an in-progress enumeration from seeing an entry twice.
        if idx <= self.cursor && self.session.is_some() {
            self.cursor += 1;
        }
        self.debug_check_sorted();
        idx
    }

    pub fn remove(&mut self, idx: usize) -> DirectoryEntry {
        let entry = self.entries.remove(idx);
        if entry.suffix > 0 {
            if let Ok(pos) = self
                .synthesized
                .binary_search_by(|s| s.short_name.as_str().cmp(&entry.short_name))
            {
                self.synthesized.remove(pos);
            }
        }
        if idx < self.cursor {
            self.cursor -= 1;
        }
        self.debug_check_sorted();
        entry
    }

    /// Forget all children. Returns them so their subtrees can be evicted.
    pub(crate) fn take_entries(&mut self) -> Vec<DirectoryEntry> {
        self.synthesized.clear();
        self.cached_in = false;
        self.cursor = 0;
        std::mem::take(&mut self.entries)
    }

    fn debug_check_sorted(&self) {
        debug_assert!(
            self.entries.windows(2).all(|w| w[0].short_name < w[1].short_name),
            "short-name view out of order in {:?}",
            self.host_path
        );
        debug_assert!(
            self.synthesized
                .windows(2)
                .all(|w| w[0].short_name < w[1].short_name),
            "synthesis view out of order in {:?}",
            self.host_path
        );
        debug_assert_eq!(
            self.synthesized.len(),
            self.entries.iter().filter(|e| e.suffix > 0).count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shorts(node: &DirectoryNode) -> Vec<&str> {
        node.entries().iter().map(|e| e.short_name.as_str()).collect()
    }

    #[test]
    fn test_arena_generations() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        assert_eq!(arena.remove(a), Some("a"));
        let b = arena.insert("b");
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_arena_clear_keeps_generations() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        arena.clear();
        assert!(arena.is_empty());
        let c = arena.insert("c");
        let d = arena.insert("d");
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), None);
        assert_eq!(arena.get(c), Some(&"c"));
        assert_eq!(arena.get(d), Some(&"d"));
    }

    #[test]
    fn test_views_stay_sorted() {
        let mut node = DirectoryNode::new("", None);
        for name in ["zeta.txt", "LongFileName.txt", "a.txt", "LongFileOther.txt", "m"] {
            node.add(name, None, false, false).unwrap();
        }
        assert_eq!(
            shorts(&node),
            vec!["A.TXT", "LONGFI~1.TXT", "LONGFI~2.TXT", "M", "ZETA.TXT"]
        );
        assert_eq!(node.synthesized().len(), 2);

        let idx = node.find_short("LONGFI~1.TXT").unwrap();
        let removed = node.remove(idx);
        assert_eq!(removed.long_name, "LongFileName.txt");
        assert_eq!(node.synthesized().len(), 1);
        assert_eq!(node.synthesized()[0].short_name, "LONGFI~2.TXT");
    }

    #[test]
    fn test_synthesized_names_unique() {
        let mut node = DirectoryNode::new("", None);
        for i in 0..30 {
            node.add(&format!("a very long file name {}.text", i), None, false, false)
                .unwrap();
        }
        let mut names = shorts(&node);
        names.dedup();
        assert_eq!(names.len(), 30);
    }

    #[test]
    fn test_host_hint_adopted() {
        let mut node = DirectoryNode::new("", None);
        node.add("Program Files", Some("progra~1"), true, false).unwrap();
        assert_eq!(node.entries()[0].short_name, "PROGRA~1");
        assert_eq!(node.entries()[0].suffix, 1);

        // Same hint again is occupied, so it is synthesized past it.
        node.add("Program Data", Some("PROGRA~1"), true, false).unwrap();
        assert!(node.find_short("PROGRA~2").is_some());
    }

    #[test]
    fn test_cursor_adjusted_on_insert_and_remove() {
        let mut node = DirectoryNode::new("", None);
        node.add("b.txt", None, false, false).unwrap();
        node.add("d.txt", None, false, false).unwrap();
        node.session = Some(SessionId::new(0, 0));
        node.cursor = 1; // B.TXT already handed out

        node.add("a.txt", None, false, false).unwrap();
        assert_eq!(node.cursor, 2);
        assert_eq!(node.entries()[node.cursor].short_name, "D.TXT");

        let idx = node.find_short("A.TXT").unwrap();
        node.remove(idx);
        assert_eq!(node.cursor, 1);
        assert_eq!(node.entries()[node.cursor].short_name, "D.TXT");
    }

    #[test]
    fn test_find_long_case() {
        let mut node = DirectoryNode::new("", None);
        node.add("ReadMe.md", None, false, false).unwrap();
        assert_eq!(node.find_long("readme.MD", false), Some(0));
        assert_eq!(node.find_long("readme.MD", true), None);
        assert_eq!(node.find_long("ReadMe.md", true), Some(0));
    }
}
