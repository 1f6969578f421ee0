//! Copy-on-write overlay over a host directory.
//!
//! - Reads come from the overlay first, then fall back to the base
//! - Writes go to the overlay only (the base is never modified)
//! - Deleting a base object leaves a tombstone marker in the overlay
//!
//! Tombstones and attribute overrides live in the overlay tree as marker
//! files (see [`marker`](super::marker)), so remounting the same pair of
//! directories restores them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;

use super::attributes::{AttributeOverride, DosAttributes};
use super::dir_cache::{DirectoryCache, Resolved};
use super::marker::{is_marker_name, Marker, MarkerOp};
use super::pattern::WildcardPattern;
use super::search::SessionId;
use super::{is_within, join_path, parent_path};
use crate::config::{MountConfig, SortOrder};
use crate::error::{DosError, DosResult};
use crate::host::{segments, LocalHostDirectory};

/// Case-folded key for a host-relative path.
fn fold(path: &str) -> String {
    path.to_uppercase()
}

/// Which tree an open file lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Layer {
    Base,
    Overlay,
}

/// An open file of an overlay mount.
#[derive(Debug)]
pub struct OverlayFile {
    file: File,
    layer: Layer,
    host_path: String,
}

impl OverlayFile {
    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Long-name path relative to the mount.
    pub fn host_path(&self) -> &str {
        &self.host_path
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }
}

impl Read for OverlayFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for OverlayFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for OverlayFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// A directory entry as a FindFirst/FindNext caller sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundEntry {
    pub short_name: String,
    pub long_name: String,
    pub is_dir: bool,
    pub attributes: DosAttributes,
    pub size: u64,
}

/// State of a running search, kept by the caller between calls.
#[derive(Debug, Clone)]
pub struct OverlaySearch {
    session: SessionId,
    dir: String,
    pattern: WildcardPattern,
}

impl OverlaySearch {
    pub fn session(&self) -> SessionId {
        self.session
    }
}

struct OverlayLayer {
    dir: PathBuf,
    cache: DirectoryCache<LocalHostDirectory>,
}

/// Union view of a base directory and a writable overlay directory.
pub struct OverlayIndex {
    base_dir: PathBuf,
    /// Union of base and overlay, keyed by base names.
    cache: DirectoryCache<LocalHostDirectory>,
    layer: Option<OverlayLayer>,
    read_only: bool,
    // Case-folded host-relative paths below.
    overlay_files: HashSet<String>,
    overlay_dirs: HashSet<String>,
    overlay_only_dirs: BTreeSet<String>,
    deleted_files: HashSet<String>,
    deleted_paths: BTreeSet<String>,
    attributes: HashMap<String, AttributeOverride>,
    /// The overlay directory itself, when it sits inside the base.
    overlap_folder: Option<String>,
}

impl OverlayIndex {
    /// Mount `config.base`, with `config.overlay` on top if given. Without an
    /// overlay the mount is read-only.
    pub fn new(config: &MountConfig) -> DosResult<Self> {
        config.validate()?;
        let base_dir = config.base.clone();
        let cache = DirectoryCache::new(LocalHostDirectory::new(&base_dir), config.cache.clone());

        let layer = match &config.overlay {
            Some(dir) => {
                if !dir.is_dir() {
                    return Err(DosError::InvalidMount(format!(
                        "overlay {} is not a directory",
                        dir.display()
                    )));
                }
                Some(OverlayLayer {
                    dir: dir.clone(),
                    cache: DirectoryCache::new(LocalHostDirectory::new(dir), config.cache.clone()),
                })
            }
            None => None,
        };

        let overlap_folder = layer
            .as_ref()
            .and_then(|l| l.dir.strip_prefix(&base_dir).ok())
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|rel| !rel.is_empty())
            .map(|rel| fold(&rel));
        if let Some(overlap) = &overlap_folder {
            debug!("overlay lies inside the base, hiding {:?}", overlap);
        }

        let mut index = Self {
            base_dir,
            cache,
            layer,
            read_only: config.read_only,
            overlay_files: HashSet::new(),
            overlay_dirs: HashSet::new(),
            overlay_only_dirs: BTreeSet::new(),
            deleted_files: HashSet::new(),
            deleted_paths: BTreeSet::new(),
            attributes: HashMap::new(),
            overlap_folder,
        };
        index.update_cache(true);
        Ok(index)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn overlay_dir(&self) -> Option<&Path> {
        self.layer.as_ref().map(|l| l.dir.as_path())
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only || self.layer.is_none()
    }

    /// The union directory cache.
    pub fn cache(&mut self) -> &mut DirectoryCache<LocalHostDirectory> {
        &mut self.cache
    }

    /// Overlay directory for a mutating call.
    fn writable_dir(&self) -> DosResult<PathBuf> {
        match &self.layer {
            Some(layer) if !self.read_only => Ok(layer.dir.clone()),
            _ => Err(DosError::WriteProtected),
        }
    }

    /// Host-relative path is tombstoned, directly or through a removed
    /// ancestor directory.
    ///
    /// An overlay object of the other kind under the same name (a directory
    /// over a deleted base file, a file over a removed base directory) is
    /// not hidden by that tombstone.
    pub fn is_deleted(&self, rel: &str) -> bool {
        if rel.is_empty() {
            return false;
        }
        let key = fold(rel);
        if self.deleted_files.contains(&key) && !self.overlay_dirs.contains(&key) {
            return true;
        }
        self.deleted_paths
            .iter()
            .any(|dir| is_within(&key, dir) && !(key == *dir && self.overlay_files.contains(&key)))
    }

    /// Directory paths that exist only in the overlay.
    pub fn overlay_only_dirs(&self) -> impl Iterator<Item = &str> {
        self.overlay_only_dirs.iter().map(String::as_str)
    }

    fn in_overlay(&self, rel: &str) -> bool {
        let key = fold(rel);
        self.overlay_files.contains(&key) || self.overlay_dirs.contains(&key)
    }

    /// Rebuild overlay state from the overlay tree and inject overlay
    /// objects into the union cache. With `reread` the overlay tree is read
    /// from disk again.
    pub fn update_cache(&mut self, reread: bool) {
        self.overlay_files.clear();
        self.overlay_dirs.clear();
        self.overlay_only_dirs.clear();
        self.deleted_files.clear();
        self.deleted_paths.clear();
        self.attributes.clear();
        if let Some(overlap) = &self.overlap_folder {
            self.deleted_paths.insert(overlap.clone());
        }

        let Some(layer) = self.layer.as_mut() else {
            return;
        };
        if reread {
            layer.cache.clear();
        }

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut markers = Vec::new();
        let mut pending = vec![String::new()];
        while let Some(dir) = pending.pop() {
            let Some(entries) = layer.cache.list_host(&dir) else {
                continue;
            };
            for entry in entries {
                if entry.is_dot() {
                    continue;
                }
                let rel = join_path(&dir, &entry.long_name);
                if is_marker_name(&entry.long_name) {
                    markers.push(rel);
                } else if entry.is_dir {
                    pending.push(rel.clone());
                    dirs.push(rel);
                } else {
                    files.push(rel);
                }
            }
        }
        let overlay_dir = layer.dir.clone();

        // Parents sort before their children.
        dirs.sort();
        for rel in dirs {
            let key = fold(&rel);
            if !self.base_dir.join(&rel).is_dir() {
                self.drop_other_kind(&rel, true);
                if let Err(err) = self.cache.add_overlay_dir(&rel) {
                    warn!("cannot add overlay directory {:?}: {}", rel, err);
                }
                self.overlay_only_dirs.insert(key.clone());
            }
            self.overlay_dirs.insert(key);
        }
        for rel in files {
            self.drop_other_kind(&rel, false);
            if let Err(err) = self.cache.add_host_entry(&rel, false, true) {
                warn!("cannot add overlay file {:?}: {}", rel, err);
            }
            self.overlay_files.insert(fold(&rel));
        }
        for rel in markers {
            let Some(marker) = Marker::parse(&rel) else {
                debug!("ignoring unknown marker {:?}", rel);
                continue;
            };
            let key = fold(&marker.target);
            match marker.op {
                MarkerOp::Delete => {
                    self.deleted_files.insert(key);
                }
                MarkerOp::RemoveDir => {
                    self.deleted_paths.insert(key);
                }
                MarkerOp::Attributes => {
                    let len = fs::metadata(overlay_dir.join(&rel))
                        .map(|m| m.len())
                        .unwrap_or(0);
                    self.attributes.insert(key, AttributeOverride::from_len(len));
                }
            }
        }
        debug!(
            "overlay: {} files, {} dirs ({} overlay only), {} deleted files, {} deleted dirs, {} attribute overrides",
            self.overlay_files.len(),
            self.overlay_dirs.len(),
            self.overlay_only_dirs.len(),
            self.deleted_files.len(),
            self.deleted_paths.len(),
            self.attributes.len()
        );
    }

    /// Drop the union cache and rebuild it from disk plus overlay state.
    pub fn empty_cache(&mut self) {
        self.cache.clear();
        self.update_cache(false);
    }

    /// Drop the union entry at `rel` if it has the wrong kind. A base object
    /// behind a tombstone can leave one there.
    fn drop_other_kind(&mut self, rel: &str, is_dir: bool) {
        let current = self.cache.resolve_host(rel);
        if current.entry.is_some_and(|e| e.is_dir != is_dir) {
            debug!("replacing base entry {:?} with an overlay object", rel);
            self.cache.remove_host_entry(rel);
        }
    }

    /// Re-read the given overlay directories and rebuild overlay state.
    fn refresh(&mut self, dirs: &[&str]) {
        if let Some(layer) = self.layer.as_mut() {
            for dir in dirs {
                layer.cache.invalidate_host(dir);
            }
        }
        self.update_cache(false);
    }

    /// Resolve a guest path that must exist and not be tombstoned.
    fn locate(&mut self, path: &str) -> DosResult<Resolved> {
        let resolved = self.cache.resolve(path);
        if resolved.missing > 1 || self.is_deleted(parent_path(&resolved.host_path)) {
            return Err(DosError::PathNotFound(path.to_string()));
        }
        if !resolved.is_found() || self.is_deleted(&resolved.host_path) {
            return Err(DosError::FileNotFound(path.to_string()));
        }
        Ok(resolved)
    }

    /// Resolve a guest path about to be created: its parent must exist.
    fn locate_new(&mut self, path: &str) -> DosResult<Resolved> {
        let resolved = self.cache.resolve(path);
        if resolved.missing > 1
            || resolved.host_path.is_empty()
            || self.is_deleted(parent_path(&resolved.host_path))
        {
            return Err(DosError::PathNotFound(path.to_string()));
        }
        Ok(resolved)
    }

    fn marker_path(overlay: &Path, rel: &str, op: MarkerOp) -> PathBuf {
        overlay.join(Marker::new(op, rel).path())
    }

    fn write_marker(overlay: &Path, rel: &str, op: MarkerOp, len: u64) -> DosResult<()> {
        let path = Self::marker_path(overlay, rel, op);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&path)?.set_len(len)?;
        debug!("wrote {} marker for {:?}", op.code(), rel);
        Ok(())
    }

    fn remove_marker(overlay: &Path, rel: &str, op: MarkerOp) -> DosResult<()> {
        match fs::remove_file(Self::marker_path(overlay, rel, op)) {
            Ok(()) => {
                debug!("removed {} marker for {:?}", op.code(), rel);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Copy a base file into the overlay.
    fn copy_up(&mut self, rel: &str) -> DosResult<()> {
        let overlay = self.writable_dir()?;
        let target = overlay.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(self.base_dir.join(rel), &target)?;
        debug!("copied {:?} into the overlay", rel);
        self.refresh(&[parent_path(rel)]);
        Ok(())
    }

    /// Attributes and size of the visible copy of a host-relative path.
    fn stat(&self, rel: &str) -> DosResult<(DosAttributes, u64)> {
        let key = fold(rel);
        let path = match &self.layer {
            Some(layer) if self.overlay_files.contains(&key) || self.overlay_dirs.contains(&key) => {
                layer.dir.join(rel)
            }
            _ => self.base_dir.join(rel),
        };
        let meta = fs::metadata(&path)?;
        let is_dir = meta.is_dir();
        let attr = DosAttributes::host_default(is_dir, !meta.permissions().readonly());
        let attr = self
            .attributes
            .get(&key)
            .map_or(attr, |ovr| ovr.apply(attr, is_dir));
        Ok((attr, if is_dir { 0 } else { meta.len() }))
    }

    /// Open an existing file. Opening a base file for writing copies it into
    /// the overlay first.
    pub fn open(&mut self, path: &str, write: bool) -> DosResult<OverlayFile> {
        let resolved = self.locate(path)?;
        if resolved.is_dir() {
            return Err(DosError::AccessDenied(path.to_string()));
        }
        let rel = resolved.host_path;
        if write {
            let overlay = self.writable_dir()?;
            if self.stat(&rel)?.0.contains(DosAttributes::READ_ONLY) {
                return Err(DosError::AccessDenied(path.to_string()));
            }
            if !self.overlay_files.contains(&fold(&rel)) {
                self.copy_up(&rel)?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(overlay.join(&rel))?;
            return Ok(OverlayFile {
                file,
                layer: Layer::Overlay,
                host_path: rel,
            });
        }

        let (layer, host) = match &self.layer {
            Some(l) if self.overlay_files.contains(&fold(&rel)) => (Layer::Overlay, l.dir.join(&rel)),
            _ => (Layer::Base, self.base_dir.join(&rel)),
        };
        let file = File::open(host)?;
        Ok(OverlayFile {
            file,
            layer,
            host_path: rel,
        })
    }

    /// Create or truncate a file in the overlay. Lifts a tombstone on the
    /// same name.
    pub fn create(&mut self, path: &str) -> DosResult<OverlayFile> {
        let overlay = self.writable_dir()?;
        let resolved = self.locate_new(path)?;
        let rel = resolved.host_path.clone();
        let exists = resolved.is_found() && !self.is_deleted(&rel);
        if exists && resolved.is_dir() {
            return Err(DosError::AccessDenied(path.to_string()));
        }

        let target = overlay.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if resolved.is_dir() && target.is_dir() {
            // Only markers of the removed directory's contents live here;
            // its RMD marker keeps them hidden.
            fs::remove_dir_all(&target)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target)?;
        Self::remove_marker(&overlay, &rel, MarkerOp::Delete)?;
        if !resolved.is_found() {
            self.cache.add_host_entry(&rel, false, true)?;
        }
        self.refresh(&[parent_path(&rel)]);
        Ok(OverlayFile {
            file,
            layer: Layer::Overlay,
            host_path: rel,
        })
    }

    /// Delete a file. A base file is hidden behind a DEL marker.
    pub fn unlink(&mut self, path: &str) -> DosResult<()> {
        let overlay = self.writable_dir()?;
        let resolved = self.locate(path)?;
        if resolved.is_dir() {
            return Err(DosError::AccessDenied(path.to_string()));
        }
        let rel = resolved.host_path;
        if self.stat(&rel)?.0.contains(DosAttributes::READ_ONLY) {
            return Err(DosError::AccessDenied(path.to_string()));
        }

        if self.overlay_files.contains(&fold(&rel)) {
            fs::remove_file(overlay.join(&rel))?;
        }
        if self.base_dir.join(&rel).is_file() {
            Self::write_marker(&overlay, &rel, MarkerOp::Delete, 0)?;
        } else {
            self.cache.remove_host_entry(&rel);
        }
        Self::remove_marker(&overlay, &rel, MarkerOp::Attributes)?;
        self.refresh(&[parent_path(&rel)]);
        Ok(())
    }

    /// Rename a file, or a directory that exists only in the overlay.
    pub fn rename(&mut self, old: &str, new: &str) -> DosResult<()> {
        let overlay = self.writable_dir()?;
        let source = self.locate(old)?;
        let target = self.locate_new(new)?;
        if source.host_path.is_empty() {
            return Err(DosError::AccessDenied(old.to_string()));
        }
        if target.is_found() && !self.is_deleted(&target.host_path) {
            return Err(DosError::AccessDenied(new.to_string()));
        }
        let old_rel = source.host_path.clone();
        let new_rel = target.host_path.clone();
        let new_host = overlay.join(&new_rel);
        if let Some(parent) = new_host.parent() {
            fs::create_dir_all(parent)?;
        }

        if source.is_dir() {
            if self.base_dir.join(&old_rel).is_dir() {
                return Err(DosError::AccessDenied(format!(
                    "{} exists in the base and can't be renamed",
                    old
                )));
            }
            fs::rename(overlay.join(&old_rel), &new_host)?;
            self.cache.rename_host_entry(&old_rel, &new_rel)?;
        } else {
            if self.overlay_files.contains(&fold(&old_rel)) {
                fs::rename(overlay.join(&old_rel), &new_host)?;
            } else {
                fs::copy(self.base_dir.join(&old_rel), &new_host)?;
            }
            if self.base_dir.join(&old_rel).is_file() {
                Self::write_marker(&overlay, &old_rel, MarkerOp::Delete, 0)?;
                self.cache.add_host_entry(&new_rel, false, true)?;
            } else {
                self.cache.rename_host_entry(&old_rel, &new_rel)?;
            }
        }
        Self::remove_marker(&overlay, &new_rel, MarkerOp::Delete)?;

        if let Some(ovr) = self.attributes.get(&fold(&old_rel)).copied() {
            Self::remove_marker(&overlay, &old_rel, MarkerOp::Attributes)?;
            Self::write_marker(&overlay, &new_rel, MarkerOp::Attributes, ovr.to_len())?;
        }
        self.refresh(&[parent_path(&old_rel), parent_path(&new_rel)]);
        Ok(())
    }

    /// Current DOS attributes of a guest path.
    pub fn get_attr(&mut self, path: &str) -> DosResult<DosAttributes> {
        let resolved = self.locate(path)?;
        Ok(self.stat(&resolved.host_path)?.0)
    }

    /// Set DOS attributes. Read-only goes to the host permission bits (on
    /// an overlay copy); hidden, system and archive go to an ATR marker.
    pub fn set_attr(&mut self, path: &str, attr: DosAttributes) -> DosResult<()> {
        let overlay = self.writable_dir()?;
        let resolved = self.locate(path)?;
        let rel = resolved.host_path.clone();
        if rel.is_empty() {
            return Err(DosError::AccessDenied(path.to_string()));
        }
        let is_dir = resolved.is_dir();
        let current = self.stat(&rel)?.0;

        let read_only = attr.contains(DosAttributes::READ_ONLY);
        if read_only != current.contains(DosAttributes::READ_ONLY) {
            if is_dir {
                warn!("ignoring read-only change on directory {:?}", rel);
            } else {
                if !self.overlay_files.contains(&fold(&rel)) {
                    self.copy_up(&rel)?;
                }
                let host = overlay.join(&rel);
                let mut permissions = fs::metadata(&host)?.permissions();
                permissions.set_readonly(read_only);
                fs::set_permissions(&host, permissions)?;
            }
        }

        let ovr = AttributeOverride::from_attributes(attr, is_dir);
        if ovr.is_default() {
            Self::remove_marker(&overlay, &rel, MarkerOp::Attributes)?;
        } else {
            Self::write_marker(&overlay, &rel, MarkerOp::Attributes, ovr.to_len())?;
        }
        self.refresh(&[parent_path(&rel)]);
        Ok(())
    }

    /// Create a directory. Recreating a removed base directory lifts its
    /// tombstone.
    pub fn make_dir(&mut self, path: &str) -> DosResult<()> {
        let overlay = self.writable_dir()?;
        let resolved = self.locate_new(path)?;
        let rel = resolved.host_path.clone();

        if resolved.is_found() {
            if resolved.is_dir() && self.deleted_paths.contains(&fold(&rel)) {
                Self::remove_marker(&overlay, &rel, MarkerOp::RemoveDir)?;
                self.refresh(&[parent_path(&rel)]);
                return Ok(());
            }
            if !(resolved.is_file() && self.is_deleted(&rel)) {
                return Err(DosError::AccessDenied(path.to_string()));
            }
            // A deleted base file: the new directory takes its name and the
            // DEL marker stays for the base file.
        }

        fs::create_dir_all(overlay.join(&rel))?;
        self.drop_other_kind(&rel, true);
        self.cache.add_overlay_dir(&rel)?;
        self.refresh(&[parent_path(&rel)]);
        Ok(())
    }

    /// Remove an empty directory.
    pub fn remove_dir(&mut self, path: &str) -> DosResult<()> {
        let overlay = self.writable_dir()?;
        let resolved = self.locate(path).map_err(|err| match err {
            DosError::FileNotFound(p) => DosError::PathNotFound(p),
            other => other,
        })?;
        if !resolved.is_dir() {
            return Err(DosError::PathNotFound(path.to_string()));
        }
        let rel = resolved.host_path;
        if rel.is_empty() {
            return Err(DosError::AccessDenied(path.to_string()));
        }

        let entries = self.cache.list_host(&rel).unwrap_or_default();
        let occupied = entries.iter().any(|e| {
            !e.is_dot() && !is_marker_name(&e.long_name) && !self.is_deleted(&join_path(&rel, &e.long_name))
        });
        if occupied {
            return Err(DosError::AccessDenied(format!("{} is not empty", path)));
        }

        if self.base_dir.join(&rel).is_dir() {
            // The overlay copy only holds markers now; they keep the old
            // contents hidden if the directory is recreated.
            Self::write_marker(&overlay, &rel, MarkerOp::RemoveDir, 0)?;
        } else {
            fs::remove_dir_all(overlay.join(&rel))?;
            self.cache.remove_host_entry(&rel);
        }
        Self::remove_marker(&overlay, &rel, MarkerOp::Attributes)?;
        self.refresh(&[parent_path(&rel)]);
        Ok(())
    }

    /// Guest path is a visible directory.
    pub fn test_dir(&mut self, path: &str) -> bool {
        self.locate(path).is_ok_and(|r| r.is_dir())
    }

    /// Guest path is a visible file.
    pub fn file_exists(&mut self, path: &str) -> bool {
        self.locate(path).is_ok_and(|r| r.is_file())
    }

    /// Start a search. The last component of `pattern` may hold `*`/`?`
    /// wildcards; an empty pattern lists the root.
    pub fn find_first(&mut self, pattern: &str, sort: SortOrder) -> DosResult<OverlaySearch> {
        let parts: Vec<&str> = segments(pattern).collect();
        let (mask, dir) = match parts.split_last() {
            Some((mask, dir)) => (*mask, dir.join("\\")),
            None => ("*.*", String::new()),
        };
        let resolved = self.cache.resolve(&dir);
        if !resolved.is_dir() || self.is_deleted(&resolved.host_path) {
            return Err(DosError::PathNotFound(pattern.to_string()));
        }
        let session = self.cache.find_first_node(resolved.node, sort)?;
        Ok(OverlaySearch {
            session,
            dir: resolved.host_path,
            pattern: WildcardPattern::parse(mask),
        })
    }

    /// Next visible match of a search, `NoMoreFiles` at the end.
    pub fn find_next(&mut self, search: &OverlaySearch) -> DosResult<FoundEntry> {
        loop {
            let entry = self.cache.find_next(search.session)?;
            if is_marker_name(&entry.long_name) || !search.pattern.matches(&entry.short_name) {
                continue;
            }
            let rel = if entry.is_dot() {
                search.dir.clone()
            } else {
                join_path(&search.dir, &entry.long_name)
            };
            if !entry.is_dot() && self.is_deleted(&rel) {
                continue;
            }
            let (attributes, size) = match self.stat(&rel) {
                Ok(stat) => stat,
                Err(err) => {
                    debug!("skipping {:?}: {}", rel, err);
                    continue;
                }
            };
            return Ok(FoundEntry {
                short_name: entry.short_name,
                long_name: entry.long_name,
                is_dir: entry.is_dir,
                attributes,
                size,
            });
        }
    }

    /// All visible matches of a pattern.
    pub fn list_dir(&mut self, pattern: &str, sort: SortOrder) -> DosResult<Vec<FoundEntry>> {
        let search = self.find_first(pattern, sort)?;
        let mut found = Vec::new();
        loop {
            match self.find_next(&search) {
                Ok(entry) => found.push(entry),
                Err(DosError::NoMoreFiles) => return Ok(found),
                Err(err) => return Err(err),
            }
        }
    }
}
