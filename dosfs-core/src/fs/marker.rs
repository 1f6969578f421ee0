//! Sidecar marker files.
//!
//! State the overlay can't express with ordinary files is kept as marker
//! files next to the object they describe. The file name encodes the
//! operation and the original name, `.DBOVERLAY_<OP>_<name>`:
//!
//! * `DEL` the base file is deleted,
//! * `RMD` the base directory is removed,
//! * `ATR` attribute override, carried in the file length.
//!
//! Every marker name is built and parsed here.

/// Leading text of every marker file name.
pub const MARKER_PREFIX: &str = ".DBOVERLAY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerOp {
    Delete,
    RemoveDir,
    Attributes,
}

impl MarkerOp {
    pub fn code(self) -> &'static str {
        match self {
            Self::Delete => "DEL",
            Self::RemoveDir => "RMD",
            Self::Attributes => "ATR",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "DEL" => Some(Self::Delete),
            "RMD" => Some(Self::RemoveDir),
            "ATR" => Some(Self::Attributes),
            _ => None,
        }
    }
}

/// A decoded marker: the operation and the `/` separated path it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub op: MarkerOp,
    pub target: String,
}

/// True if a file name looks like a marker (known operation or not).
pub fn is_marker_name(file_name: &str) -> bool {
    file_name.len() > MARKER_PREFIX.len() + 5 && file_name.starts_with(MARKER_PREFIX)
}

impl Marker {
    pub fn new(op: MarkerOp, target: impl Into<String>) -> Self {
        Self {
            op,
            target: target.into(),
        }
    }

    /// Marker file name for the last component of the target.
    pub fn file_name(&self) -> String {
        let name = self.target.rsplit('/').next().unwrap_or(&self.target);
        format!("{}_{}_{}", MARKER_PREFIX, self.op.code(), name)
    }

    /// Path of the marker file, in the target's directory.
    pub fn path(&self) -> String {
        match self.target.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, self.file_name()),
            None => self.file_name(),
        }
    }

    /// Decode a marker from its relative path. None for ordinary files and
    /// markers with an unknown operation.
    pub fn parse(path: &str) -> Option<Self> {
        let (dir, file_name) = match path.rsplit_once('/') {
            Some((dir, name)) => (Some(dir), name),
            None => (None, path),
        };
        if !is_marker_name(file_name) {
            return None;
        }
        let rest = file_name[MARKER_PREFIX.len()..].strip_prefix('_')?;
        let (code, name) = rest.split_once('_')?;
        if name.is_empty() {
            return None;
        }
        let op = MarkerOp::from_code(code)?;
        let target = match dir {
            Some(dir) => format!("{}/{}", dir, name),
            None => name.to_string(),
        };
        Some(Self { op, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_paths() {
        let marker = Marker::new(MarkerOp::Delete, "DOC.TXT");
        assert_eq!(marker.path(), ".DBOVERLAY_DEL_DOC.TXT");

        let nested = Marker::new(MarkerOp::Attributes, "GAMES/SAVE/slot1.dat");
        assert_eq!(nested.path(), "GAMES/SAVE/.DBOVERLAY_ATR_slot1.dat");
        assert_eq!(Marker::parse(&nested.path()), Some(nested));
    }

    #[test]
    fn test_parse_rejects_non_markers() {
        assert_eq!(Marker::parse("README.TXT"), None);
        assert_eq!(Marker::parse(".DBOVERLAY_DEL_"), None);
        assert_eq!(Marker::parse(".DBOVERLAY_XYZ_FILE"), None);
        assert!(is_marker_name(".DBOVERLAY_XYZ_FILE"));
        assert_eq!(
            Marker::parse("SUB/.DBOVERLAY_RMD_OLD"),
            Some(Marker::new(MarkerOp::RemoveDir, "SUB/OLD"))
        );
    }
}
