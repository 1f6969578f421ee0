//! Directory cache.
//!
//! An in-memory index over a host directory tree that gives every entry a
//! DOS short name. Directories are read from the [`HostDirectory`] the first
//! time a path reaches them ("cached in") and then trusted until invalidated.
//!
//! Guest paths use `\` or `/` and may mix short and long names (long names
//! only with LFN enabled). Host paths are the `/` separated long-name paths
//! relative to the host root.

use log::{debug, warn};

use super::dir_node::{Arena, DirectoryEntry, DirectoryNode, NodeId};
use super::search::{SearchSessionTable, SessionId};
use super::short_name::{hashed_short_name, remove_trailing_dot, synthesize};
use super::{is_within, join_path};
use crate::config::{CacheConfig, SortOrder};
use crate::error::{DosError, DosResult};
use crate::host::{segments, HostDirectory};

/// How path segments are matched against cached entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// Short names, plus long names in LFN mode.
    Guest,
    /// Short or long names regardless of LFN mode.
    Any,
    /// Long names only, as the host spells them.
    Host,
}

/// Outcome of walking a path through the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Deepest directory reached.
    pub node: NodeId,
    /// Long-name path, `/` separated. Unmatched segments are appended as given.
    pub host_path: String,
    /// Short-name path, `\` separated.
    pub dos_path: String,
    /// Trailing segments that did not resolve.
    pub missing: usize,
    /// The final entry when the whole path resolved (None for the root).
    pub entry: Option<DirectoryEntry>,
}

impl Resolved {
    pub fn is_found(&self) -> bool {
        self.missing == 0
    }

    /// Resolved to the root or to a directory entry.
    pub fn is_dir(&self) -> bool {
        self.is_found() && self.entry.as_ref().map_or(true, |e| e.is_dir)
    }

    /// Resolved to a file entry.
    pub fn is_file(&self) -> bool {
        self.is_found() && self.entry.as_ref().is_some_and(|e| !e.is_dir)
    }
}

#[derive(Debug)]
struct Memo {
    key: String,
    lookup: Lookup,
    resolved: Resolved,
}

/// Split off the last segment of a path.
fn split_last(path: &str) -> (String, &str) {
    let parts: Vec<&str> = segments(path).collect();
    match parts.split_last() {
        Some((last, parents)) => (parents.join("/"), last),
        None => (String::new(), ""),
    }
}

pub struct DirectoryCache<H: HostDirectory> {
    host: H,
    config: CacheConfig,
    nodes: Arena<DirectoryNode>,
    root: NodeId,
    sessions: SearchSessionTable,
    memo: Option<Memo>,
}

impl<H: HostDirectory> DirectoryCache<H> {
    pub fn new(host: H, config: CacheConfig) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.insert(DirectoryNode::new("", None));
        let sessions = SearchSessionTable::new(config.max_open_dirs, config.max_find_sessions);
        Self {
            host,
            config,
            nodes,
            root,
            sessions,
            memo: None,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Direct host access. Changes made here are not seen until the affected
    /// directory is invalidated.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&DirectoryNode> {
        self.nodes.get(id)
    }

    pub fn sessions(&self) -> &SearchSessionTable {
        &self.sessions
    }

    /// Number of cached directories.
    pub fn cached_dirs(&self) -> usize {
        self.nodes.len()
    }

    fn cache_in(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.cached_in {
            return;
        }
        let path = node.host_path.clone();
        let Some(listing) = self.host.open(&path) else {
            debug!("cannot open host directory {:?}", path);
            return;
        };
        for host_entry in listing {
            if let Err(err) = node.add(
                &host_entry.name,
                host_entry.short_hint.as_deref(),
                host_entry.is_dir,
                false,
            ) {
                warn!("skipping {:?} in {:?}: {}", host_entry.name, path, err);
            }
        }
        node.cached_in = true;
        debug!("cached in {:?} ({} entries)", path, node.entries().len());
    }

    fn find_segment(&self, id: NodeId, segment: &str, lookup: Lookup) -> Option<usize> {
        let node = self.nodes.get(id)?;
        if lookup == Lookup::Host {
            return node
                .find_long(segment, true)
                .or_else(|| node.find_long(segment, false));
        }

        let exact = self.config.lfn && self.config.exact_case;
        let short = if exact {
            segment.to_string()
        } else {
            segment.to_ascii_uppercase()
        };
        let short = remove_trailing_dot(&short);
        if let Some(idx) = node.find_short(short) {
            return Some(idx);
        }
        if self.config.lfn || lookup == Lookup::Any {
            if let Some(idx) = node.find_long(segment, self.config.exact_case) {
                return Some(idx);
            }
        }
        // Short names derived elsewhere with the hashed scheme.
        if short.contains('~') {
            return node
                .entries()
                .iter()
                .position(|e| !e.is_dot() && hashed_short_name(&e.long_name) == short);
        }
        None
    }

    fn child_node(&mut self, parent: NodeId, idx: usize) -> Option<NodeId> {
        let node = self.nodes.get(parent)?;
        let entry = node.entries().get(idx)?;
        if let Some(child) = entry.child {
            if self.nodes.contains(child) {
                return Some(child);
            }
        }
        let host_path = join_path(node.host_path(), &entry.long_name);
        let child = self.nodes.insert(DirectoryNode::new(host_path, Some(parent)));
        self.nodes.get_mut(parent)?.entry_mut(idx)?.child = Some(child);
        Some(child)
    }

    /// Host spellings are kept as is; siblings may differ only in case.
    fn memo_key(&self, path: &str, lookup: Lookup) -> String {
        let joined = segments(path).collect::<Vec<_>>().join("\\");
        if self.config.exact_case || lookup == Lookup::Host {
            joined
        } else {
            joined.to_uppercase()
        }
    }

    fn walk(&mut self, path: &str, lookup: Lookup) -> Resolved {
        let key = self.memo_key(path, lookup);
        if let Some(memo) = &self.memo {
            if memo.key == key && memo.lookup == lookup && self.nodes.contains(memo.resolved.node) {
                return memo.resolved.clone();
            }
        }

        let segs: Vec<&str> = segments(path).collect();
        let mut node = self.root;
        let mut host_parts: Vec<String> = Vec::new();
        let mut dos_parts: Vec<String> = Vec::new();
        let mut entry: Option<DirectoryEntry> = None;
        let mut missing = 0;

        for (i, &segment) in segs.iter().enumerate() {
            match segment {
                "." => continue,
                ".." => {
                    if let Some(parent) = self.nodes.get(node).and_then(|n| n.parent) {
                        node = parent;
                        host_parts.pop();
                        dos_parts.pop();
                    }
                    entry = None;
                    continue;
                }
                _ => {}
            }

            self.cache_in(node);
            let found = self.find_segment(node, segment, lookup).and_then(|idx| {
                let e = self.nodes.get(node)?.entries().get(idx)?.clone();
                Some((idx, e))
            });
            let Some((idx, e)) = found else {
                missing = segs.len() - i;
                break;
            };
            let last = i + 1 == segs.len();
            if !e.is_dir && !last {
                missing = segs.len() - i;
                break;
            }
            host_parts.push(e.long_name.clone());
            dos_parts.push(e.short_name.clone());
            if e.is_dir {
                match self.child_node(node, idx) {
                    Some(child) => node = child,
                    None => {
                        missing = segs.len() - i;
                        host_parts.pop();
                        dos_parts.pop();
                        break;
                    }
                }
            }
            entry = Some(e);
        }

        if missing > 0 {
            entry = None;
            for segment in &segs[segs.len() - missing..] {
                let literal = if self.config.lfn || lookup == Lookup::Host {
                    segment.to_string()
                } else {
                    segment.to_ascii_uppercase()
                };
                host_parts.push(literal.clone());
                dos_parts.push(literal);
            }
        }

        let resolved = Resolved {
            node,
            host_path: host_parts.join("/"),
            dos_path: dos_parts.join("\\"),
            missing,
            entry,
        };
        self.memo = Some(Memo {
            key,
            lookup,
            resolved: resolved.clone(),
        });
        resolved
    }

    /// Walk a guest path, caching in directories along the way.
    pub fn resolve(&mut self, path: &str) -> Resolved {
        self.walk(path, Lookup::Guest)
    }

    /// Walk a long-name host path.
    pub fn resolve_host(&mut self, path: &str) -> Resolved {
        self.walk(path, Lookup::Host)
    }

    /// Entry at a guest path, if present.
    pub fn lookup(&mut self, path: &str) -> Option<DirectoryEntry> {
        self.resolve(path).entry
    }

    /// Forget the memo if a change at `host_path` may affect it.
    fn touch(&mut self, host_path: &str) {
        let related = self.memo.as_ref().is_some_and(|m| {
            is_within(&m.resolved.host_path, host_path) || is_within(host_path, &m.resolved.host_path)
        });
        if related {
            self.memo = None;
        }
    }

    /// Resolve the parent directory of `path` and name the last segment.
    fn parent_of<'p>(&mut self, path: &'p str, lookup: Lookup) -> DosResult<(Resolved, &'p str)> {
        let (parent_path, name) = split_last(path);
        if name.is_empty() {
            return Err(DosError::PathNotFound(path.to_string()));
        }
        let parent = self.walk(&parent_path, lookup);
        if !parent.is_dir() {
            return Err(DosError::PathNotFound(path.to_string()));
        }
        self.cache_in(parent.node);
        Ok((parent, name))
    }

    fn add_with(
        &mut self,
        path: &str,
        lookup: Lookup,
        is_dir: bool,
        overlay: bool,
        check_exists: bool,
    ) -> DosResult<(NodeId, usize)> {
        let (parent, name) = self.parent_of(path, lookup)?;
        if check_exists {
            if let Some(idx) = self.find_segment(parent.node, name, lookup) {
                return Ok((parent.node, idx));
            }
        }
        let long_name = if lookup == Lookup::Guest && !self.config.lfn {
            name.to_ascii_uppercase()
        } else {
            name.to_string()
        };
        let node = self
            .nodes
            .get_mut(parent.node)
            .ok_or_else(|| DosError::PathNotFound(path.to_string()))?;
        let idx = node.add(&long_name, None, is_dir, overlay)?;
        debug!(
            "added {:?} as {} in {:?}",
            long_name,
            node.entries()[idx].short_name,
            node.host_path()
        );
        let host_path = node.host_path.clone();
        self.touch(&host_path);
        Ok((parent.node, idx))
    }

    fn short_name_at(&self, node: NodeId, idx: usize) -> String {
        self.nodes
            .get(node)
            .and_then(|n| n.entries().get(idx))
            .map(|e| e.short_name.clone())
            .unwrap_or_default()
    }

    /// Add an entry for a newly created guest path. Returns its short name.
    /// With `check_exists` an existing entry is kept as is.
    pub fn add_entry(&mut self, path: &str, is_dir: bool, check_exists: bool) -> DosResult<String> {
        let (node, idx) = self.add_with(path, Lookup::Guest, is_dir, false, check_exists)?;
        Ok(self.short_name_at(node, idx))
    }

    /// Add an entry by host path, keeping an existing one.
    pub fn add_host_entry(&mut self, path: &str, is_dir: bool, overlay: bool) -> DosResult<String> {
        let (node, idx) = self.add_with(path, Lookup::Host, is_dir, overlay, true)?;
        Ok(self.short_name_at(node, idx))
    }

    /// Add a directory that exists only in an overlay. Its node is cached in
    /// right away with just `.` and `..`, so the base host is never asked.
    pub fn add_overlay_dir(&mut self, path: &str) -> DosResult<String> {
        let (parent, idx) = self.add_with(path, Lookup::Host, true, true, true)?;
        let short = self.short_name_at(parent, idx);
        let from_overlay = self
            .nodes
            .get(parent)
            .and_then(|n| n.entries().get(idx))
            .is_some_and(|e| e.is_dir && e.overlay);
        if !from_overlay {
            // Also present on the host; its node reads the host as usual.
            return Ok(short);
        }
        let child = self
            .child_node(parent, idx)
            .ok_or_else(|| DosError::PathNotFound(path.to_string()))?;
        if let Some(node) = self.nodes.get_mut(child) {
            if !node.cached_in {
                node.add(".", None, true, true)?;
                node.add("..", None, true, true)?;
                node.cached_in = true;
            }
        }
        Ok(short)
    }

    fn remove_with(&mut self, path: &str, lookup: Lookup, ignore_parent_invalidate: bool) -> bool {
        let Ok((parent, name)) = self.parent_of(path, lookup) else {
            return false;
        };
        match self.find_segment(parent.node, name, lookup) {
            Some(idx) => {
                let Some(node) = self.nodes.get_mut(parent.node) else {
                    return false;
                };
                let removed = node.remove(idx);
                let host_path = node.host_path.clone();
                if let Some(child) = removed.child {
                    self.evict(child);
                }
                debug!("removed {:?} from {:?}", removed.long_name, host_path);
                self.touch(&host_path);
                true
            }
            None => {
                if !ignore_parent_invalidate {
                    self.invalidate_node(parent.node);
                }
                false
            }
        }
    }

    /// Drop the entry for a guest path, evicting its subtree. When it isn't
    /// cached the parent is invalidated instead unless told otherwise.
    pub fn remove_entry(&mut self, path: &str, ignore_parent_invalidate: bool) -> bool {
        self.remove_with(path, Lookup::Guest, ignore_parent_invalidate)
    }

    pub fn remove_host_entry(&mut self, path: &str) -> bool {
        self.remove_with(path, Lookup::Host, true)
    }

    fn rename_with(&mut self, old: &str, new: &str, lookup: Lookup) -> DosResult<String> {
        let entry = self
            .walk(old, lookup)
            .entry
            .ok_or_else(|| DosError::FileNotFound(old.to_string()))?;
        self.remove_with(old, lookup, true);
        let overlay = entry.overlay;
        let (node, idx) = self.add_with(new, lookup, entry.is_dir, overlay, true)?;
        Ok(self.short_name_at(node, idx))
    }

    /// Move an entry to a new guest path. Returns the new short name.
    pub fn rename_entry(&mut self, old: &str, new: &str) -> DosResult<String> {
        self.rename_with(old, new, Lookup::Guest)
    }

    pub fn rename_host_entry(&mut self, old: &str, new: &str) -> DosResult<String> {
        self.rename_with(old, new, Lookup::Host)
    }

    /// Remove a node and everything below it from the arena.
    fn evict(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.remove(id) else {
                continue;
            };
            if let Some(session) = node.session {
                self.sessions.close_dir(session);
            }
            stack.extend(node.entries().iter().filter_map(|e| e.child));
        }
    }

    fn invalidate_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let host_path = node.host_path.clone();
        let children: Vec<NodeId> = node.take_entries().into_iter().filter_map(|e| e.child).collect();
        for child in children {
            self.evict(child);
        }
        debug!("invalidated {:?}", host_path);
        self.touch(&host_path);
    }

    /// Forget the cached children of the directory at a guest path (or the
    /// deepest existing ancestor) so the host is read again.
    pub fn invalidate(&mut self, path: &str) {
        let resolved = self.resolve(path);
        self.invalidate_node(resolved.node);
    }

    pub fn invalidate_host(&mut self, path: &str) {
        let resolved = self.resolve_host(path);
        self.invalidate_node(resolved.node);
    }

    /// Drop the whole cache. Open-directory handles die with it; running
    /// FindFirst searches keep their snapshots.
    pub fn clear(&mut self) {
        for node in self.sessions.reset_open_dirs() {
            debug!("open directory {:?} closed by cache clear", node);
        }
        self.nodes.clear();
        self.root = self.nodes.insert(DirectoryNode::new("", None));
        self.memo = None;
    }

    /// Long name for the last segment of a guest path.
    pub fn short_to_long(&mut self, path: &str) -> Option<String> {
        self.walk(path, Lookup::Any).entry.map(|e| e.long_name)
    }

    /// Short name for the last segment of a guest path. A long name not in
    /// the cache that would need synthesis gets its hashed form.
    pub fn long_to_short(&mut self, path: &str) -> Option<String> {
        let resolved = self.walk(path, Lookup::Any);
        if let Some(entry) = resolved.entry {
            return Some(entry.short_name);
        }
        if resolved.missing != 1 {
            return None;
        }
        let (_, name) = split_last(path);
        synthesize(name, &[], |_| false)
            .ok()
            .filter(|short| short.is_synthesized())
            .map(|_| hashed_short_name(name))
    }

    /// Full long-name form of a guest path, `\` separated.
    pub fn long_path(&mut self, path: &str) -> Option<String> {
        let resolved = self.walk(path, Lookup::Any);
        resolved
            .is_found()
            .then(|| resolved.host_path.replace('/', "\\"))
    }

    /// Full short-name form of a guest path.
    pub fn short_path(&mut self, path: &str) -> Option<String> {
        let resolved = self.walk(path, Lookup::Any);
        resolved.is_found().then_some(resolved.dos_path)
    }

    /// Entries of the directory at a host path, caching it in.
    pub fn list_host(&mut self, path: &str) -> Option<Vec<DirectoryEntry>> {
        let resolved = self.resolve_host(path);
        if !resolved.is_dir() {
            return None;
        }
        self.cache_in(resolved.node);
        self.nodes.get(resolved.node).map(|n| n.entries().to_vec())
    }

    /// Reserve an open-directory handle on the directory at a guest path.
    pub fn open_dir(&mut self, path: &str) -> DosResult<SessionId> {
        let resolved = self.resolve(path);
        if !resolved.is_dir() {
            return Err(DosError::PathNotFound(path.to_string()));
        }
        let id = resolved.node;
        self.cache_in(id);

        let reserved = self.nodes.get(id).and_then(|n| n.session);
        if let Some(session) = reserved {
            if self.sessions.open_dir_node(session) == Some(id) {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.cursor = 0;
                }
                return Ok(session);
            }
        }

        let (session, evicted) = self.sessions.open_dir(id);
        for stale in evicted {
            if let Some(node) = self.nodes.get_mut(stale) {
                node.session = None;
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.session = Some(session);
            node.cursor = 0;
        }
        Ok(session)
    }

    /// Next live entry of an open directory. The handle is released at the end.
    pub fn read_dir(&mut self, session: SessionId) -> Option<DirectoryEntry> {
        let Some(id) = self.sessions.open_dir_node(session) else {
            debug!("open directory {} is not live", session);
            return None;
        };
        let Some(node) = self.nodes.get_mut(id) else {
            self.sessions.close_dir(session);
            return None;
        };
        match node.entries().get(node.cursor).cloned() {
            Some(entry) => {
                node.cursor += 1;
                Some(entry)
            }
            None => {
                node.session = None;
                self.sessions.close_dir(session);
                None
            }
        }
    }

    /// Start a FindFirst search over a snapshot of a cached directory.
    pub fn find_first_node(&mut self, id: NodeId, sort: SortOrder) -> DosResult<SessionId> {
        self.cache_in(id);
        let entries = self
            .nodes
            .get(id)
            .map(|n| n.entries().to_vec())
            .ok_or_else(|| DosError::PathNotFound(format!("{:?}", id)))?;
        Ok(self.sessions.find_first(id, sort, entries))
    }

    /// Start a FindFirst search over the directory at a guest path.
    pub fn find_first(&mut self, path: &str, sort: SortOrder) -> DosResult<SessionId> {
        let resolved = self.resolve(path);
        if !resolved.is_dir() {
            return Err(DosError::PathNotFound(path.to_string()));
        }
        self.find_first_node(resolved.node, sort)
    }

    pub fn find_next(&mut self, session: SessionId) -> DosResult<DirectoryEntry> {
        self.sessions.find_next(session)
    }

    pub fn end_find(&mut self, session: SessionId) -> bool {
        self.sessions.end_find(session)
    }
}
