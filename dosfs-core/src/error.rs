//! Error types for the DOS filesystem layer.

use thiserror::Error;

/// DOS error codes reported back to the file-API layer.
pub mod code {
    pub const FILE_NOT_FOUND: u16 = 0x02;
    pub const PATH_NOT_FOUND: u16 = 0x03;
    pub const TOO_MANY_OPEN_FILES: u16 = 0x04;
    pub const ACCESS_DENIED: u16 = 0x05;
    pub const INVALID_HANDLE: u16 = 0x06;
    pub const NO_MORE_FILES: u16 = 0x12;
    pub const WRITE_PROTECTED: u16 = 0x13;
    pub const FILE_EXISTS: u16 = 0x50;
}

/// Errors that can occur while serving DOS file calls.
#[derive(Error, Debug)]
pub enum DosError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("No more files")]
    NoMoreFiles,

    #[error("Write protected")]
    WriteProtected,

    #[error("File exists: {0}")]
    FileExists(String),

    #[error("Invalid search handle: {0}")]
    InvalidHandle(u32),

    /// Search slots or short-name suffix space ran out.
    #[error("Exhausted: {0}")]
    Exhausted(String),

    /// Name could not be translated between guest and host.
    #[error("Name not representable: {0}")]
    NonRepresentable(String),

    #[error("Invalid mount: {0}")]
    InvalidMount(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DosError {
    /// DOS error code for this error, as returned in AX by the file API.
    pub fn dos_code(&self) -> u16 {
        match self {
            Self::FileNotFound(_) | Self::NonRepresentable(_) => code::FILE_NOT_FOUND,
            Self::PathNotFound(_) | Self::InvalidMount(_) => code::PATH_NOT_FOUND,
            Self::AccessDenied(_) | Self::Io(_) | Self::Json(_) => code::ACCESS_DENIED,
            Self::NoMoreFiles => code::NO_MORE_FILES,
            Self::WriteProtected => code::WRITE_PROTECTED,
            Self::FileExists(_) => code::FILE_EXISTS,
            Self::InvalidHandle(_) => code::INVALID_HANDLE,
            Self::Exhausted(_) => code::TOO_MANY_OPEN_FILES,
        }
    }

    /// True for the routine "it isn't there" family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_) | Self::PathNotFound(_) | Self::NonRepresentable(_)
        )
    }
}

/// Result type for DOS filesystem operations.
pub type DosResult<T> = Result<T, DosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dos_codes() {
        assert_eq!(DosError::FileNotFound("A.TXT".into()).dos_code(), 2);
        assert_eq!(DosError::PathNotFound("SUB".into()).dos_code(), 3);
        assert_eq!(DosError::NoMoreFiles.dos_code(), 18);
        assert_eq!(DosError::WriteProtected.dos_code(), 19);
        assert_eq!(DosError::FileExists("A.TXT".into()).dos_code(), 0x50);
    }

    #[test]
    fn test_non_representable_is_not_found() {
        let err = DosError::NonRepresentable("\u{1F600}.TXT".into());
        assert!(err.is_not_found());
        assert_eq!(err.dos_code(), code::FILE_NOT_FOUND);
    }
}
