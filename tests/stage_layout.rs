// tests/stage_layout.rs

mod common;
use crate::common::builders::layout_for;
use crate::common::ROOT;

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use gridstage::errors::GridstageError;
use gridstage::fs::mock::MockFileSystem;
use gridstage::fs::{FileSystem, RealFileSystem, leaf_dirs, read_lines};
use gridstage::layout::{CallerIds, WorkerDir, remove_owned_dir};

#[test]
fn test_worker_dir_kinds() {
    assert_eq!(WorkerDir::classify("1234_7"), WorkerDir::Worker { cluster: 1234, process: 7 });
    assert_eq!(WorkerDir::classify("1234_stop"), WorkerDir::StreamStop { cluster: 1234 });
    assert_eq!(WorkerDir::classify("log"), WorkerDir::FetchedLogs);
    assert_eq!(WorkerDir::classify("scratch"), WorkerDir::Unknown);
    assert_eq!(WorkerDir::classify("1234_x"), WorkerDir::Unknown);
    assert!(WorkerDir::classify("9_start").is_stream_helper());
    assert_eq!(
        WorkerDir::classify_path(Path::new("/grid/dt/out/gen/55_3")).process(),
        Some(3)
    );
}

#[test]
fn test_make_and_check_dirs() {
    let fs = MockFileSystem::new();
    let layout = layout_for("gen", ROOT);

    match layout.check_dirs(&fs) {
        Err(GridstageError::Structural { path, .. }) => {
            assert_eq!(path, PathBuf::from("/grid/dt/out/gen"));
        }
        other => panic!("expected Structural, got {other:?}"),
    }

    layout.make_dirs(&fs).unwrap();
    layout.check_dirs(&fs).unwrap();
    assert_eq!(layout.first_non_empty(&fs).unwrap(), None);

    fs.add_file("/grid/dt/log/gen/jobids.list", "1.0@x\n");
    assert_eq!(
        layout.first_non_empty(&fs).unwrap(),
        Some(PathBuf::from("/grid/dt/log/gen"))
    );
}

#[test]
fn test_remove_owned_dir_checks_owner() {
    let fs = MockFileSystem::new();
    fs.add_file("/grid/dt/out/gen/1_0/a.root", "data");
    fs.set_owner("/grid/dt/out/gen", 501);
    let dir = Path::new("/grid/dt/out/gen");

    let stranger = CallerIds { uid: 600, euid: 600 };
    assert!(matches!(
        remove_owned_dir(&fs, dir, stranger),
        Err(GridstageError::Ownership { owner: 501, .. })
    ));
    assert!(fs.exists(dir));

    // Effective uid counts as owner too.
    let setuid = CallerIds { uid: 600, euid: 501 };
    assert!(remove_owned_dir(&fs, dir, setuid).unwrap());
    assert!(!fs.exists(dir));
    assert!(!remove_owned_dir(&fs, dir, setuid).unwrap());
}

#[test]
fn test_real_filesystem_helpers() {
    let tmp = TempDir::new().unwrap();
    let fs = RealFileSystem;
    let root = tmp.path().join("out");

    fs.write(&root.join("1_0").join("files.list"), b"a.root\n\n  b.root \n").unwrap();
    fs.create_dir_all(&root.join("1_1").join("nested")).unwrap();

    assert_eq!(
        read_lines(&fs, &root.join("1_0").join("files.list")).unwrap(),
        vec!["a.root", "b.root"]
    );
    assert_eq!(
        leaf_dirs(&fs, &root).unwrap(),
        vec![root.join("1_0"), root.join("1_1").join("nested")]
    );

    let link = root.join("files.list");
    fs.symlink(&root.join("1_0").join("files.list"), &link).unwrap();
    assert_eq!(read_lines(&fs, &link).unwrap().len(), 2);

    let uid = fs.owner_uid(&root).unwrap();
    let caller = CallerIds::current();
    if caller.owns(uid) {
        assert!(remove_owned_dir(&fs, &root, caller).unwrap());
        assert!(!fs.exists(&root));
    }
}
