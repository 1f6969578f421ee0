//! Bounded pools of directory search sessions.
//!
//! Two independent pools live here:
//!
//! * open-directory handles, which iterate a live [`DirectoryNode`] through
//!   its own cursor, and
//! * FindFirst/FindNext sessions, which iterate a sorted snapshot taken when
//!   the search started.
//!
//! Both are fixed-capacity rings. When every slot is taken the pool is reset
//! wholesale rather than failing the request; callers holding ids from before
//! the reset find them stale.
//!
//! A FindFirst snapshot is never refreshed: if the directory is invalidated
//! while a search is running the search finishes on the old contents.
//!
//! [`DirectoryNode`]: super::DirectoryNode

use std::fmt;

use log::{debug, error, warn};

use super::dir_node::{DirectoryEntry, NodeId};
use crate::config::SortOrder;
use crate::error::{DosError, DosResult};

/// Handle to a search session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    slot: u32,
    generation: u32,
}

impl SessionId {
    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Slot number, the value a guest sees in its search record.
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.slot, self.generation)
    }
}

#[derive(Debug)]
struct PoolSlot<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-capacity ring of generational slots.
#[derive(Debug)]
pub(crate) struct SessionPool<T> {
    slots: Vec<PoolSlot<T>>,
    next: usize,
    label: &'static str,
}

impl<T> SessionPool<T> {
    pub(crate) fn new(capacity: usize, label: &'static str) -> Self {
        let slots = (0..capacity.max(1))
            .map(|_| PoolSlot {
                generation: 0,
                value: None,
            })
            .collect();
        Self {
            slots,
            next: 0,
            label,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    /// Take the next free slot after the last one handed out, wrapping.
    /// A full pool is reset first; the evicted values are returned.
    pub(crate) fn insert(&mut self, value: T) -> (SessionId, Vec<T>) {
        let capacity = self.slots.len();
        let free = (0..capacity)
            .map(|i| (self.next + i) % capacity)
            .find(|&i| self.slots[i].value.is_none());

        let (index, evicted) = match free {
            Some(index) => (index, Vec::new()),
            None => {
                warn!(
                    "all {} {} sessions in use, resetting the pool",
                    capacity, self.label
                );
                (0, self.reset())
            }
        };

        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.next = (index + 1) % capacity;
        (SessionId::new(index as u32, slot.generation), evicted)
    }

    fn slot(&self, id: SessionId) -> Option<&PoolSlot<T>> {
        self.slots
            .get(id.slot as usize)
            .filter(|s| s.generation == id.generation)
    }

    pub(crate) fn get(&self, id: SessionId) -> Option<&T> {
        self.slot(id).and_then(|s| s.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: SessionId) -> Option<&mut T> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.value.as_mut())
    }

    pub(crate) fn in_range(&self, id: SessionId) -> bool {
        (id.slot as usize) < self.slots.len()
    }

    pub(crate) fn remove(&mut self, id: SessionId) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.slot as usize)
            .filter(|s| s.generation == id.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        Some(value)
    }

    /// Free every slot, invalidating all outstanding ids.
    pub(crate) fn reset(&mut self) -> Vec<T> {
        let mut evicted = Vec::new();
        for slot in &mut self.slots {
            if let Some(value) = slot.value.take() {
                evicted.push(value);
            }
            slot.generation = slot.generation.wrapping_add(1);
        }
        self.next = 0;
        evicted
    }
}

/// A FindFirst/FindNext enumeration.
#[derive(Debug, Clone)]
pub struct FindSession {
    pub source: NodeId,
    pub sort: SortOrder,
    snapshot: Vec<DirectoryEntry>,
    cursor: usize,
}

impl FindSession {
    /// `entries` must be in short-name order, as a node keeps them.
    fn new(source: NodeId, sort: SortOrder, mut entries: Vec<DirectoryEntry>) -> Self {
        sort_snapshot(&mut entries, sort);
        Self {
            source,
            sort,
            snapshot: entries,
            cursor: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.snapshot.len() - self.cursor
    }
}

/// Order a short-name-sorted entry list for a FindFirst snapshot.
pub fn sort_snapshot(entries: &mut [DirectoryEntry], sort: SortOrder) {
    match sort {
        SortOrder::Unsorted => entries.sort_by_key(|e| e.ordinal),
        SortOrder::Alphabetical => {}
        SortOrder::AlphabeticalReversed => entries.reverse(),
        SortOrder::DirectoriesFirst => entries.sort_by_key(|e| !e.is_dir),
        SortOrder::DirectoriesFirstReversed => {
            entries.reverse();
            entries.sort_by_key(|e| !e.is_dir);
        }
    }
}

/// Open-directory handles plus FindFirst sessions.
#[derive(Debug)]
pub struct SearchSessionTable {
    open_dirs: SessionPool<NodeId>,
    finds: SessionPool<FindSession>,
}

impl SearchSessionTable {
    pub fn new(max_open_dirs: usize, max_find_sessions: usize) -> Self {
        Self {
            open_dirs: SessionPool::new(max_open_dirs, "open directory"),
            finds: SessionPool::new(max_find_sessions, "find"),
        }
    }

    /// Reserve an open-directory slot for `node`. Returns the id and the
    /// nodes whose reservations were dropped by a pool reset. Running out of
    /// open-directory slots also drops every FindFirst session.
    pub(crate) fn open_dir(&mut self, node: NodeId) -> (SessionId, Vec<NodeId>) {
        let (id, evicted) = self.open_dirs.insert(node);
        if !evicted.is_empty() {
            let dropped = self.finds.reset();
            warn!("open directories exhausted, dropped {} find sessions", dropped.len());
        }
        (id, evicted)
    }

    pub(crate) fn open_dir_node(&self, id: SessionId) -> Option<NodeId> {
        self.open_dirs.get(id).copied()
    }

    pub(crate) fn close_dir(&mut self, id: SessionId) -> Option<NodeId> {
        self.open_dirs.remove(id)
    }

    pub(crate) fn reset_open_dirs(&mut self) -> Vec<NodeId> {
        self.open_dirs.reset()
    }

    /// Start a FindFirst enumeration over a copy of `entries`.
    pub fn find_first(&mut self, source: NodeId, sort: SortOrder, entries: Vec<DirectoryEntry>) -> SessionId {
        let (id, evicted) = self.finds.insert(FindSession::new(source, sort, entries));
        if !evicted.is_empty() {
            debug!("dropped {} find sessions", evicted.len());
        }
        id
    }

    /// Hand out the next snapshot entry. The session is released when it
    /// runs dry.
    pub fn find_next(&mut self, id: SessionId) -> DosResult<DirectoryEntry> {
        if !self.finds.in_range(id) {
            error!("find session {} out of range", id);
            return Err(DosError::InvalidHandle(id.slot));
        }
        let Some(session) = self.finds.get_mut(id) else {
            debug!("find session {} is no longer live", id);
            return Err(DosError::NoMoreFiles);
        };
        match session.snapshot.get(session.cursor) {
            Some(entry) => {
                let entry = entry.clone();
                session.cursor += 1;
                Ok(entry)
            }
            None => {
                self.finds.remove(id);
                Err(DosError::NoMoreFiles)
            }
        }
    }

    pub fn find_session(&self, id: SessionId) -> Option<&FindSession> {
        self.finds.get(id)
    }

    /// Abandon a search before it is exhausted.
    pub fn end_find(&mut self, id: SessionId) -> bool {
        self.finds.remove(id).is_some()
    }

    pub fn live_finds(&self) -> usize {
        self.finds.live()
    }

    pub fn live_open_dirs(&self) -> usize {
        self.open_dirs.live()
    }

    pub fn capacity(&self) -> (usize, usize) {
        (self.open_dirs.capacity(), self.finds.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::dir_node::{Arena, DirectoryNode};

    fn entry(short: &str, is_dir: bool, ordinal: u64) -> DirectoryEntry {
        DirectoryEntry {
            long_name: short.to_string(),
            short_name: short.to_string(),
            suffix: 0,
            is_dir,
            overlay: false,
            ordinal,
            child: None,
        }
    }

    fn sample() -> Vec<DirectoryEntry> {
        vec![
            entry("A.TXT", false, 2),
            entry("B", true, 0),
            entry("C.TXT", false, 1),
            entry("D", true, 3),
        ]
    }

    fn order(entries: &[DirectoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.short_name.as_str()).collect()
    }

    fn node_id() -> NodeId {
        Arena::new().insert(DirectoryNode::new("", None))
    }

    #[test]
    fn test_sort_orders() {
        let cases = [
            (SortOrder::Unsorted, vec!["B", "C.TXT", "A.TXT", "D"]),
            (SortOrder::Alphabetical, vec!["A.TXT", "B", "C.TXT", "D"]),
            (SortOrder::AlphabeticalReversed, vec!["D", "C.TXT", "B", "A.TXT"]),
            (SortOrder::DirectoriesFirst, vec!["B", "D", "A.TXT", "C.TXT"]),
            (SortOrder::DirectoriesFirstReversed, vec!["D", "B", "C.TXT", "A.TXT"]),
        ];
        for (sort, expected) in cases {
            let mut entries = sample();
            sort_snapshot(&mut entries, sort);
            assert_eq!(order(&entries), expected, "{:?}", sort);
        }
    }

    #[test]
    fn test_find_next_exhausts_and_frees() {
        let mut table = SearchSessionTable::new(4, 4);
        let id = table.find_first(node_id(), SortOrder::Alphabetical, sample());
        assert_eq!(table.live_finds(), 1);

        let mut seen = Vec::new();
        loop {
            match table.find_next(id) {
                Ok(e) => seen.push(e.short_name),
                Err(err) => {
                    assert!(matches!(err, DosError::NoMoreFiles));
                    break;
                }
            }
        }
        assert_eq!(seen, vec!["A.TXT", "B", "C.TXT", "D"]);
        assert_eq!(table.live_finds(), 0);
        assert!(matches!(table.find_next(id), Err(DosError::NoMoreFiles)));
    }

    #[test]
    fn test_concurrent_sessions_independent() {
        let mut table = SearchSessionTable::new(4, 4);
        let a = table.find_first(node_id(), SortOrder::Alphabetical, sample());
        let b = table.find_first(node_id(), SortOrder::AlphabeticalReversed, sample());
        assert_eq!(table.find_next(a).unwrap().short_name, "A.TXT");
        assert_eq!(table.find_next(b).unwrap().short_name, "D");
        assert_eq!(table.find_next(a).unwrap().short_name, "B");
        assert_eq!(table.find_session(b).unwrap().remaining(), 3);
    }

    #[test]
    fn test_exhausted_pool_is_reset() {
        let mut table = SearchSessionTable::new(1, 2);
        let first = table.find_first(node_id(), SortOrder::Alphabetical, sample());
        let _second = table.find_first(node_id(), SortOrder::Alphabetical, sample());
        let third = table.find_first(node_id(), SortOrder::Alphabetical, sample());

        assert_eq!(table.live_finds(), 1);
        assert_eq!(third.slot(), 0);
        // The first id shares slot 0 but is from an older generation.
        assert!(matches!(table.find_next(first), Err(DosError::NoMoreFiles)));
        assert_eq!(table.find_next(third).unwrap().short_name, "A.TXT");
    }

    #[test]
    fn test_open_dir_exhaustion_drops_finds() {
        let mut table = SearchSessionTable::new(2, 4);
        let find = table.find_first(node_id(), SortOrder::Alphabetical, sample());
        let (a, evicted) = table.open_dir(node_id());
        assert!(evicted.is_empty());
        table.open_dir(node_id());
        assert_eq!(table.live_finds(), 1);

        let (c, evicted) = table.open_dir(node_id());
        assert_eq!(evicted.len(), 2);
        assert_eq!(c.slot(), 0);
        assert_eq!(table.open_dir_node(a), None);
        assert_eq!(table.live_finds(), 0);
        assert!(matches!(table.find_next(find), Err(DosError::NoMoreFiles)));
    }

    #[test]
    fn test_out_of_range_id() {
        let mut table = SearchSessionTable::new(1, 1);
        let bogus = SessionId::new(7, 0);
        assert!(matches!(table.find_next(bogus), Err(DosError::InvalidHandle(7))));
    }

    #[test]
    fn test_ring_wraps() {
        let mut pool: SessionPool<u32> = SessionPool::new(3, "test");
        let (a, _) = pool.insert(1);
        let (b, _) = pool.insert(2);
        pool.remove(a);
        let (c, _) = pool.insert(3);
        assert_eq!(b.slot(), 1);
        assert_eq!(c.slot(), 2);
        let (d, evicted) = pool.insert(4);
        assert_eq!(d.slot(), 0);
        assert!(evicted.is_empty());
        assert_eq!(pool.get(a), None);
        assert_eq!(pool.get(d), Some(&4));
    }
}
