//! DOS Directory Cache and Overlay Filesystem Core
//!
//! This crate provides the host-directory layer of a DOS emulator:
//! - 8.3 short-name synthesis for long host names
//! - Directory cache with open-directory and FindFirst/FindNext sessions
//! - Copy-on-write overlay with tombstones and attribute overrides
//!
//! # Architecture
//!
//! The layers stack from the host upwards:
//! - `HostDirectory` trait: lists one directory of the host tree
//! - `DirectoryCache`: per-directory short-name index, keyed by `NodeId`
//! - `SearchSessionTable`: bounded session pools over cached directories
//! - `OverlayIndex`: union of a read-only base and a writable overlay

pub mod config;
pub mod error;
pub mod fs;
pub mod host;

pub use config::{CacheConfig, MountConfig, SortOrder, DEFAULT_MAX_OPEN_DIRS};
pub use error::{DosError, DosResult};
pub use fs::{
    DirectoryCache, DirectoryEntry, DosAttributes, FoundEntry, Layer, OverlayFile, OverlayIndex,
    OverlaySearch, Resolved, SearchSessionTable, SessionId, WildcardPattern,
};
pub use host::{
    AsciiNames, HostDirIter, HostDirectory, HostEntry, LocalHostDirectory, MemoryHostDirectory,
    NameTranslator, Utf8Names,
};
