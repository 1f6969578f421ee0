//! Integration tests for overlay mounts over real host directories.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use dosfs_core::fs::AttributeOverride;
use dosfs_core::{CacheConfig, DosAttributes, DosError, MountConfig, OverlayIndex, SortOrder};
use tempfile::TempDir;

struct Volume {
    _tmp: TempDir,
    base: PathBuf,
    overlay: PathBuf,
}

impl Volume {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("base");
        let overlay = tmp.path().join("overlay");
        fs::create_dir_all(base.join("SUB")).unwrap();
        fs::create_dir(&overlay).unwrap();
        fs::write(base.join("A.TXT"), b"a").unwrap();
        fs::write(base.join("DOC.TXT"), b"original document").unwrap();
        fs::write(base.join("LongFileName.txt"), b"long").unwrap();
        Self {
            _tmp: tmp,
            base,
            overlay,
        }
    }

    fn config(&self) -> MountConfig {
        MountConfig::new(&self.base).with_overlay(&self.overlay)
    }

    fn mount(&self) -> OverlayIndex {
        OverlayIndex::new(&self.config()).unwrap()
    }
}

fn read_all(index: &mut OverlayIndex, path: &str) -> Vec<u8> {
    let mut data = Vec::new();
    index
        .open(path, false)
        .expect("open for reading")
        .read_to_end(&mut data)
        .unwrap();
    data
}

fn short_names(index: &mut OverlayIndex, pattern: &str, sort: SortOrder) -> Vec<String> {
    index
        .list_dir(pattern, sort)
        .unwrap()
        .into_iter()
        .map(|e| e.short_name)
        .collect()
}

#[test]
fn test_deleted_file_stays_deleted() {
    let vol = Volume::new();
    let mut index = vol.mount();
    index.unlink("DOC.TXT").unwrap();

    assert!(matches!(index.open("DOC.TXT", false), Err(DosError::FileNotFound(_))));
    let marker = vol.overlay.join(".DBOVERLAY_DEL_DOC.TXT");
    assert!(marker.is_file());
    assert_eq!(fs::metadata(&marker).unwrap().len(), 0);

    index.update_cache(true);
    assert!(matches!(index.open("DOC.TXT", false), Err(DosError::FileNotFound(_))));

    let mut remounted = vol.mount();
    assert!(!remounted.file_exists("DOC.TXT"));
    assert_eq!(
        fs::read(vol.base.join("DOC.TXT")).unwrap(),
        b"original document"
    );
}

#[test]
fn test_copy_on_write_leaves_base_alone() {
    let vol = Volume::new();
    let mut index = vol.mount();

    let mut file = index.open("doc.txt", true).unwrap();
    file.set_len(0).unwrap();
    file.write_all(b"edited").unwrap();
    drop(file);

    assert_eq!(read_all(&mut index, "DOC.TXT"), b"edited");
    assert_eq!(fs::read(vol.overlay.join("DOC.TXT")).unwrap(), b"edited");
    assert_eq!(
        fs::read(vol.base.join("DOC.TXT")).unwrap(),
        b"original document"
    );

    let mut remounted = vol.mount();
    assert_eq!(read_all(&mut remounted, "DOC.TXT"), b"edited");
}

#[test]
fn test_hidden_system_marker() {
    let vol = Volume::new();
    let mut index = vol.mount();
    let attr = DosAttributes::HIDDEN | DosAttributes::SYSTEM | DosAttributes::ARCHIVE;
    index.set_attr("A.TXT", attr).unwrap();

    let len = fs::metadata(vol.overlay.join(".DBOVERLAY_ATR_A.TXT"))
        .unwrap()
        .len();
    assert_eq!(
        AttributeOverride::from_len(len),
        AttributeOverride {
            hidden: true,
            system: true,
            archive_inverted: false,
        }
    );

    let mut remounted = vol.mount();
    assert_eq!(remounted.get_attr("A.TXT").unwrap(), attr);
}

#[test]
fn test_directories_first_listing() {
    let vol = Volume::new();
    let mut index = vol.mount();

    assert_eq!(
        short_names(&mut index, "*.*", SortOrder::DirectoriesFirst),
        vec!["SUB", "A.TXT", "DOC.TXT", "LONGFI~1.TXT"]
    );
    assert_eq!(
        short_names(&mut index, "*.*", SortOrder::DirectoriesFirstReversed),
        vec!["SUB", "LONGFI~1.TXT", "DOC.TXT", "A.TXT"]
    );
    assert_eq!(
        short_names(&mut index, "*.*", SortOrder::AlphabeticalReversed),
        vec!["SUB", "LONGFI~1.TXT", "DOC.TXT", "A.TXT"]
    );
    assert_eq!(
        short_names(&mut index, "?.TXT", SortOrder::Alphabetical),
        vec!["A.TXT"]
    );
}

#[test]
fn test_listing_reports_attributes_and_size() {
    let vol = Volume::new();
    let mut index = vol.mount();
    let found = index.list_dir("DOC.TXT", SortOrder::Alphabetical).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].long_name, "DOC.TXT");
    assert_eq!(found[0].size, 17);
    assert_eq!(found[0].attributes, DosAttributes::ARCHIVE);

    let sub = index.list_dir("SUB", SortOrder::Alphabetical).unwrap();
    assert!(sub[0].is_dir);
    assert!(sub[0].attributes.contains(DosAttributes::DIRECTORY));
}

#[test]
fn test_overlay_only_dir_survives_remount() {
    let vol = Volume::new();
    let mut index = vol.mount();
    index.make_dir("SAVES").unwrap();
    index
        .create("SAVES\\SLOT1.SAV")
        .unwrap()
        .write_all(b"progress")
        .unwrap();
    assert!(!vol.base.join("SAVES").exists());

    let mut remounted = vol.mount();
    assert!(remounted.test_dir("SAVES"));
    assert_eq!(read_all(&mut remounted, "SAVES\\SLOT1.SAV"), b"progress");
    assert_eq!(
        short_names(&mut remounted, "SAVES\\*.*", SortOrder::DirectoriesFirst),
        vec![".", "..", "SLOT1.SAV"]
    );
}

#[test]
fn test_missing_parent_is_path_not_found() {
    let vol = Volume::new();
    let mut index = vol.mount();
    assert!(matches!(index.create("NOPE\\X.TXT"), Err(DosError::PathNotFound(_))));
    assert!(matches!(index.open("NOPE\\X.TXT", false), Err(DosError::PathNotFound(_))));
    assert!(matches!(
        index.list_dir("NOPE\\*.*", SortOrder::Alphabetical),
        Err(DosError::PathNotFound(_))
    ));
    assert!(matches!(index.remove_dir("NOPE"), Err(DosError::PathNotFound(_))));
}

#[test]
fn test_rename_rules() {
    let vol = Volume::new();
    let mut index = vol.mount();

    index.rename("DOC.TXT", "NOTES.TXT").unwrap();
    assert!(!index.file_exists("DOC.TXT"));
    assert_eq!(read_all(&mut index, "NOTES.TXT"), b"original document");
    assert!(vol.overlay.join(".DBOVERLAY_DEL_DOC.TXT").is_file());

    assert!(matches!(index.rename("A.TXT", "NOTES.TXT"), Err(DosError::AccessDenied(_))));
    assert!(matches!(index.rename("SUB", "SUB2"), Err(DosError::AccessDenied(_))));

    // The old name is free again.
    index.rename("NOTES.TXT", "DOC.TXT").unwrap();
    assert_eq!(read_all(&mut index, "DOC.TXT"), b"original document");
    assert!(!vol.overlay.join(".DBOVERLAY_DEL_DOC.TXT").exists());
}

#[test]
fn test_long_names_with_lfn() {
    let vol = Volume::new();
    let config = vol.config().with_cache(CacheConfig::lfn());
    let mut index = OverlayIndex::new(&config).unwrap();

    assert_eq!(read_all(&mut index, "longfilename.txt"), b"long");
    assert_eq!(read_all(&mut index, "LONGFI~1.TXT"), b"long");

    index.create("Another Long Name.dat").unwrap();
    assert!(vol.overlay.join("Another Long Name.dat").is_file());
    let found = index
        .list_dir("ANOTHE~1.DAT", SortOrder::Alphabetical)
        .unwrap();
    assert_eq!(found[0].long_name, "Another Long Name.dat");
}

#[test]
fn test_read_only_mount_rejects_writes() {
    let vol = Volume::new();
    let config = MountConfig {
        read_only: true,
        ..vol.config()
    };
    let mut index = OverlayIndex::new(&config).unwrap();
    assert!(matches!(index.open("DOC.TXT", true), Err(DosError::WriteProtected)));
    assert!(matches!(index.make_dir("NEW"), Err(DosError::WriteProtected)));
    assert!(matches!(
        index.set_attr("A.TXT", DosAttributes::HIDDEN),
        Err(DosError::WriteProtected)
    ));
    assert_eq!(read_all(&mut index, "DOC.TXT"), b"original document");
    assert!(is_empty_dir(&vol.overlay));
}

#[test]
fn test_search_sessions_recycle() {
    let vol = Volume::new();
    let config = vol.config().with_cache(CacheConfig {
        max_find_sessions: 2,
        ..CacheConfig::default()
    });
    let mut index = OverlayIndex::new(&config).unwrap();

    let first = index.find_first("*.*", SortOrder::Alphabetical).unwrap();
    let _second = index.find_first("*.*", SortOrder::Alphabetical).unwrap();
    // The pool is full: this start recycles every slot.
    let third = index.find_first("*.*", SortOrder::Alphabetical).unwrap();

    assert!(matches!(index.find_next(&first), Err(DosError::NoMoreFiles)));
    assert_eq!(index.find_next(&third).unwrap().short_name, "A.TXT");
}

#[test]
fn test_mount_from_json() {
    let vol = Volume::new();
    let json = serde_json::json!({
        "base": vol.base,
        "overlay": vol.overlay,
        "lfn": true,
        "dirSort": "alphabetical",
    });
    let path = vol.overlay.parent().unwrap().join("mount.json");
    fs::write(&path, json.to_string()).unwrap();

    let config = MountConfig::load(&path).unwrap();
    assert_eq!(config.cache.dir_sort, SortOrder::Alphabetical);
    let mut index = OverlayIndex::new(&config).unwrap();
    assert!(index.file_exists("LongFileName.txt"));
}

#[test]
fn test_missing_overlay_is_invalid_mount() {
    let vol = Volume::new();
    let config = MountConfig::new(&vol.base).with_overlay(vol.base.join("..").join("nowhere"));
    assert!(matches!(OverlayIndex::new(&config), Err(DosError::InvalidMount(_))));
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).unwrap().next().is_none()
}
