//! Mount and cache configuration.
//!
//! Configuration is plain data with serde defaults so a mount can be described
//! by a small JSON file:
//!
//! ```json
//! { "base": "/games/dos", "overlay": "/games/dos-save", "lfn": true, "dirSort": "alphabetical" }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DosError, DosResult};

/// Default number of open-directory and FindFirst slots (per pool).
pub const DEFAULT_MAX_OPEN_DIRS: usize = 2048;

/// Order in which FindFirst/FindNext hand out directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    /// Host discovery order.
    Unsorted,
    /// By short name.
    Alphabetical,
    /// By short name, descending.
    AlphabeticalReversed,
    /// Directories before files, each group by short name.
    #[default]
    DirectoriesFirst,
    /// Directories before files, each group by short name descending.
    DirectoriesFirstReversed,
}

/// Behaviour of a single DirectoryCache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Accept long names in guest paths (LFN API active).
    #[serde(default)]
    pub lfn: bool,
    /// Long-name comparisons are case sensitive.
    #[serde(default)]
    pub exact_case: bool,
    #[serde(default)]
    pub dir_sort: SortOrder,
    #[serde(default = "default_max_open_dirs")]
    pub max_open_dirs: usize,
    #[serde(default = "default_max_open_dirs")]
    pub max_find_sessions: usize,
}

fn default_max_open_dirs() -> usize {
    DEFAULT_MAX_OPEN_DIRS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lfn: false,
            exact_case: false,
            dir_sort: SortOrder::default(),
            max_open_dirs: DEFAULT_MAX_OPEN_DIRS,
            max_find_sessions: DEFAULT_MAX_OPEN_DIRS,
        }
    }
}

impl CacheConfig {
    /// Long-name mode with case-insensitive matching.
    pub fn lfn() -> Self {
        Self {
            lfn: true,
            ..Self::default()
        }
    }
}

/// A host directory mounted as a DOS volume, optionally with a writable overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountConfig {
    pub base: PathBuf,
    #[serde(default)]
    pub overlay: Option<PathBuf>,
    /// Reject every mutating call with "write protected".
    #[serde(default)]
    pub read_only: bool,
    #[serde(flatten)]
    pub cache: CacheConfig,
}

impl MountConfig {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            overlay: None,
            read_only: false,
            cache: CacheConfig::default(),
        }
    }

    pub fn with_overlay(mut self, overlay: impl Into<PathBuf>) -> Self {
        self.overlay = Some(overlay.into());
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Parse a JSON mount description.
    pub fn from_json_str(text: &str) -> DosResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a JSON mount description from disk.
    pub fn load(path: &Path) -> DosResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check the paths make sense together.
    pub fn validate(&self) -> DosResult<()> {
        if !self.base.is_dir() {
            return Err(DosError::InvalidMount(format!(
                "base {} is not a directory",
                self.base.display()
            )));
        }
        if let Some(overlay) = &self.overlay {
            if overlay == &self.base {
                return Err(DosError::InvalidMount(
                    "overlay directory can not be the base directory".to_string(),
                ));
            }
            if overlay.is_absolute() != self.base.is_absolute() {
                return Err(DosError::InvalidMount(
                    "base and overlay must both be absolute or both relative".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let cfg = MountConfig::from_json_str(r#"{ "base": "/dos" }"#).unwrap();
        assert_eq!(cfg.base, PathBuf::from("/dos"));
        assert_eq!(cfg.overlay, None);
        assert!(!cfg.read_only);
        assert_eq!(cfg.cache, CacheConfig::default());
        assert_eq!(cfg.cache.dir_sort, SortOrder::DirectoriesFirst);
    }

    #[test]
    fn test_flattened_cache_options() {
        let cfg = MountConfig::from_json_str(
            r#"{
                "base": "/dos",
                "overlay": "/save",
                "lfn": true,
                "exactCase": true,
                "dirSort": "alphabeticalReversed",
                "maxFindSessions": 4
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.overlay, Some(PathBuf::from("/save")));
        assert!(cfg.cache.lfn);
        assert!(cfg.cache.exact_case);
        assert_eq!(cfg.cache.dir_sort, SortOrder::AlphabeticalReversed);
        assert_eq!(cfg.cache.max_find_sessions, 4);
        assert_eq!(cfg.cache.max_open_dirs, DEFAULT_MAX_OPEN_DIRS);
    }

    #[test]
    fn test_overlay_equal_to_base_is_rejected() {
        let dir = std::env::temp_dir();
        let cfg = MountConfig::new(&dir).with_overlay(&dir);
        assert!(matches!(cfg.validate(), Err(DosError::InvalidMount(_))));
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(matches!(
            MountConfig::from_json_str("{ not json"),
            Err(DosError::Json(_))
        ));
    }
}
