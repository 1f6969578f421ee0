//! DOS filesystem layer.
//!
//! This module provides the layered view of a host directory tree:
//! - `DirectoryCache`: short-name index over a `HostDirectory`
//! - `SearchSessionTable`: open-directory and FindFirst/FindNext sessions
//! - `OverlayIndex`: writable overlay with tombstones and attribute overrides

pub mod attributes;
pub mod dir_cache;
pub mod dir_node;
pub mod marker;
pub mod overlay;
pub mod pattern;
pub mod search;
pub mod short_name;

pub use attributes::{AttributeOverride, DosAttributes};
pub use dir_cache::{DirectoryCache, Resolved};
pub use dir_node::{DirectoryEntry, DirectoryNode, NodeId};
pub use marker::{Marker, MarkerOp, MARKER_PREFIX};
pub use overlay::{FoundEntry, Layer, OverlayFile, OverlayIndex, OverlaySearch};
pub use pattern::WildcardPattern;
pub use search::{SearchSessionTable, SessionId};
pub use short_name::{hashed_short_name, synthesize, ShortName};

/// Join a `/` separated relative path and a name.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Directory part of a `/` separated relative path.
pub(crate) fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// True if `path` lies at or below `dir`. The empty path is the root.
pub(crate) fn is_within(path: &str, dir: &str) -> bool {
    dir.is_empty()
        || path == dir
        || (path.starts_with(dir) && path.as_bytes().get(dir.len()) == Some(&b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_within() {
        assert!(is_within("SUB/A.TXT", "SUB"));
        assert!(is_within("SUB", "SUB"));
        assert!(is_within("ANY", ""));
        assert!(!is_within("SUBDIR/A.TXT", "SUB"));
        assert!(!is_within("", "SUB"));
    }

    #[test]
    fn test_path_parts() {
        assert_eq!(join_path("", "A.TXT"), "A.TXT");
        assert_eq!(join_path("SUB", "A.TXT"), "SUB/A.TXT");
        assert_eq!(parent_path("SUB/DEEP/A.TXT"), "SUB/DEEP");
        assert_eq!(parent_path("A.TXT"), "");
    }
}
