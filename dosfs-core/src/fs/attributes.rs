//! DOS file attributes and the override a host file can't store itself.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// DOS attribute byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DosAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

impl DosAttributes {
    /// What a plain host object reports before any override.
    pub fn host_default(is_dir: bool, writable: bool) -> Self {
        let mut attr = if is_dir {
            Self::DIRECTORY
        } else {
            Self::ARCHIVE
        };
        if !writable {
            attr |= Self::READ_ONLY;
        }
        attr
    }
}

impl fmt::Display for DosAttributes {
    /// `ATTRIB` style flag letters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |bit: Self, c: char| if self.contains(bit) { c } else { ' ' };
        write!(
            f,
            "{}{}{}{}{}",
            flag(Self::ARCHIVE, 'A'),
            flag(Self::SYSTEM, 'S'),
            flag(Self::HIDDEN, 'H'),
            flag(Self::READ_ONLY, 'R'),
            flag(Self::DIRECTORY, 'D'),
        )
    }
}

const ARCHIVE_INVERTED_BIT: u64 = 1;
const HIDDEN_BIT: u64 = 2;
const SYSTEM_BIT: u64 = 4;

/// Attribute bits kept in the length of an ATR marker file.
///
/// The archive bit is stored relative to the default (set for files, clear
/// for directories).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeOverride {
    pub hidden: bool,
    pub system: bool,
    pub archive_inverted: bool,
}

impl AttributeOverride {
    pub fn from_attributes(attr: DosAttributes, is_dir: bool) -> Self {
        Self {
            hidden: attr.contains(DosAttributes::HIDDEN),
            system: attr.contains(DosAttributes::SYSTEM),
            archive_inverted: attr.contains(DosAttributes::ARCHIVE) == is_dir,
        }
    }

    /// Nothing to record; the marker should not exist.
    pub fn is_default(&self) -> bool {
        !self.hidden && !self.system && !self.archive_inverted
    }

    pub fn to_len(self) -> u64 {
        let mut len = 0;
        if self.archive_inverted {
            len |= ARCHIVE_INVERTED_BIT;
        }
        if self.hidden {
            len |= HIDDEN_BIT;
        }
        if self.system {
            len |= SYSTEM_BIT;
        }
        len
    }

    pub fn from_len(len: u64) -> Self {
        Self {
            archive_inverted: len & ARCHIVE_INVERTED_BIT != 0,
            hidden: len & HIDDEN_BIT != 0,
            system: len & SYSTEM_BIT != 0,
        }
    }

    /// Layer the override over host attributes.
    pub fn apply(self, mut attr: DosAttributes, is_dir: bool) -> DosAttributes {
        if self.archive_inverted {
            attr.set(DosAttributes::ARCHIVE, is_dir);
        }
        attr.set(DosAttributes::HIDDEN, self.hidden);
        attr.set(DosAttributes::SYSTEM, self.system);
        attr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_system_payload() {
        let attr = DosAttributes::HIDDEN | DosAttributes::SYSTEM | DosAttributes::ARCHIVE;
        let ovr = AttributeOverride::from_attributes(attr, false);
        assert_eq!(ovr.to_len(), 6);
        assert_eq!(
            AttributeOverride::from_len(6),
            AttributeOverride {
                hidden: true,
                system: true,
                archive_inverted: false
            }
        );
    }

    #[test]
    fn test_archive_relative_to_kind() {
        // Files default to archive, directories don't.
        assert!(AttributeOverride::from_attributes(DosAttributes::ARCHIVE, false).is_default());
        assert!(AttributeOverride::from_attributes(DosAttributes::DIRECTORY, true).is_default());

        let cleared = AttributeOverride::from_attributes(DosAttributes::empty(), false);
        assert!(cleared.archive_inverted);
        assert_eq!(cleared.to_len(), 1);
        let host = DosAttributes::host_default(false, true);
        assert_eq!(cleared.apply(host, false), DosAttributes::empty());

        let dir = AttributeOverride::from_attributes(DosAttributes::DIRECTORY | DosAttributes::ARCHIVE, true);
        let host = DosAttributes::host_default(true, true);
        assert_eq!(
            dir.apply(host, true),
            DosAttributes::DIRECTORY | DosAttributes::ARCHIVE
        );
    }

    #[test]
    fn test_display_letters() {
        let attr = DosAttributes::ARCHIVE | DosAttributes::READ_ONLY;
        assert_eq!(attr.to_string(), "A  R ");
    }
}
