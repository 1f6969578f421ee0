//! Host directory access.
//!
//! The directory cache never touches the host filesystem directly. It asks a
//! [`HostDirectory`] to enumerate one directory at a time; names crossing the
//! guest/host boundary go through a [`NameTranslator`].
//!
//! Paths handed to a `HostDirectory` are relative to its root, use `/` as the
//! separator and carry host (long) names. The empty string is the root.

use std::ffi::{OsStr, OsString};

mod local;
mod memory;

pub use local::LocalHostDirectory;
pub use memory::MemoryHostDirectory;

/// One directory entry as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    /// Long (host) name, already translated to the guest character set.
    pub name: String,
    /// Short name the host already knows for this entry, if any.
    pub short_hint: Option<String>,
    pub is_dir: bool,
}

impl HostEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_hint: None,
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_hint: None,
            is_dir: true,
        }
    }
}

/// An open host directory. Dropping the iterator closes it.
pub type HostDirIter<'a> = Box<dyn Iterator<Item = HostEntry> + 'a>;

/// Enumerates host directories for the directory cache.
pub trait HostDirectory: Send {
    /// Open a directory. Returns None if it does not exist or can't be read.
    fn open(&self, path: &str) -> Option<HostDirIter<'_>>;
}

/// Guest/host name conversion.
///
/// A name that fails conversion is "not representable": the cache skips it
/// during enumeration and lookups report it as not found.
pub trait NameTranslator: Send + Sync {
    fn to_guest(&self, host: &OsStr) -> Option<String>;
    fn to_host(&self, guest: &str) -> Option<OsString>;
}

/// Lossless UTF-8 names.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Names;

impl NameTranslator for Utf8Names {
    fn to_guest(&self, host: &OsStr) -> Option<String> {
        host.to_str().map(str::to_string)
    }

    fn to_host(&self, guest: &str) -> Option<OsString> {
        Some(OsString::from(guest))
    }
}

/// Printable ASCII only, as seen by a guest without a code page loaded.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsciiNames;

impl AsciiNames {
    fn representable(name: &str) -> bool {
        name.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
    }
}

impl NameTranslator for AsciiNames {
    fn to_guest(&self, host: &OsStr) -> Option<String> {
        host.to_str()
            .filter(|s| Self::representable(s))
            .map(str::to_string)
    }

    fn to_host(&self, guest: &str) -> Option<OsString> {
        Self::representable(guest).then(|| OsString::from(guest))
    }
}

/// The `.` and `..` entries every non-root DOS directory carries.
pub(crate) fn dot_entries() -> [HostEntry; 2] {
    [HostEntry::dir("."), HostEntry::dir("..")]
}

/// Split a `/` or `\` separated path into non-empty segments.
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_names_reject_non_ascii() {
        let names = AsciiNames;
        assert_eq!(names.to_guest(OsStr::new("readme.txt")), Some("readme.txt".into()));
        assert_eq!(names.to_guest(OsStr::new("r\u{e9}sum\u{e9}.doc")), None);
        assert!(names.to_host("caf\u{e9}").is_none());
    }

    #[test]
    fn test_segments_accept_both_separators() {
        let parts: Vec<&str> = segments("\\SUB/DIR\\\\FILE.TXT").collect();
        assert_eq!(parts, vec!["SUB", "DIR", "FILE.TXT"]);
        assert_eq!(segments("").count(), 0);
    }
}
