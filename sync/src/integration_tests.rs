//! Whole-cycle tests over real temporary trees

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use filetime::FileTime;
use tempfile::TempDir;

use crate::scanner::stat_entry;
use crate::{mirror_once, RootPair, SyncEngine, SyncOptions};

/// Temporary source/destination pair
pub struct MirrorFixture {
    _temp_dir: TempDir,
    pub roots: RootPair,
}

impl MirrorFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("source")).unwrap();
        std::fs::create_dir(temp_dir.path().join("dest")).unwrap();
        let roots = RootPair::new(temp_dir.path().join("source"), temp_dir.path().join("dest")).unwrap();

        Self {
            _temp_dir: temp_dir,
            roots,
        }
    }

    pub fn src(&self, relative: &str) -> PathBuf {
        self.roots.source().join(relative)
    }

    pub fn dst(&self, relative: &str) -> PathBuf {
        self.roots.destination().join(relative)
    }

    pub fn write_src(&self, relative: &str, content: &[u8], mtime_secs: i64) {
        write_with_mtime(&self.src(relative), content, mtime_secs);
    }

    pub fn write_dst(&self, relative: &str, content: &[u8], mtime_secs: i64) {
        write_with_mtime(&self.dst(relative), content, mtime_secs);
    }
}

fn write_with_mtime(path: &Path, content: &[u8], mtime_secs: i64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
}

fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}

const T: i64 = 1_700_000_000;

fn options(recursive: bool, size_threshold: u64) -> SyncOptions {
    SyncOptions {
        recursive,
        size_threshold,
    }
}

#[tokio::test]
async fn newer_source_file_overwrites_destination() {
    let fixture = MirrorFixture::new();
    fixture.write_src("a.txt", b"fresh content", T + 10);
    fixture.write_dst("a.txt", b"old", T);

    let metrics = mirror_once(&fixture.roots, options(false, 0)).await;

    assert_eq!(std::fs::read(fixture.dst("a.txt")).unwrap(), b"fresh content");
    assert_eq!(
        mtime(&fixture.dst("a.txt")),
        SystemTime::UNIX_EPOCH + Duration::from_secs((T + 10) as u64)
    );
    assert_eq!(metrics.files.copied, 1);
}

#[tokio::test]
async fn stale_destination_file_is_purged() {
    let fixture = MirrorFixture::new();
    fixture.write_dst("stale.txt", b"stale", T);

    let metrics = mirror_once(&fixture.roots, options(false, 0)).await;

    assert!(!fixture.dst("stale.txt").exists());
    assert_eq!(metrics.files.files_removed, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn empty_source_subdirectory_is_created_with_its_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = MirrorFixture::new();
    std::fs::create_dir(fixture.src("sub")).unwrap();
    std::fs::set_permissions(fixture.src("sub"), std::fs::Permissions::from_mode(0o750)).unwrap();

    mirror_once(&fixture.roots, options(true, 0)).await;

    let created = stat_entry(&fixture.dst("sub"), Path::new("sub"))
        .await
        .unwrap()
        .unwrap();
    assert!(created.is_dir());
    assert_eq!(created.permissions, 0o750);
    assert_eq!(std::fs::read_dir(fixture.dst("sub")).unwrap().count(), 0);
}

#[tokio::test]
async fn second_cycle_without_changes_copies_nothing() {
    let fixture = MirrorFixture::new();
    fixture.write_src("one.txt", b"1", T);
    fixture.write_src("nested/two.txt", b"2", T + 1);
    fixture.write_src("nested/deeper/three.bin", &vec![7u8; 10_000], T + 2);

    let engine = SyncEngine::new(options(true, 4096));
    let first = engine.run_cycle(&fixture.roots).await;
    let second = engine.run_cycle(&fixture.roots).await;

    assert_eq!(first.files.copied, 3);
    assert_eq!(first.files.mapped_copies, 1);
    assert_eq!(first.files.directories_created, 2);
    assert!(second.is_noop(), "second cycle did work: {}", second.summary());
    assert!(second.is_successful());
}

#[tokio::test]
async fn freshness_holds_across_the_tree() {
    let fixture = MirrorFixture::new();
    fixture.write_src("top.txt", b"top v2", T + 50);
    fixture.write_dst("top.txt", b"top v1", T);
    fixture.write_src("dir/mid.txt", b"mid v2", T + 50);
    fixture.write_dst("dir/mid.txt", b"mid v1", T);
    fixture.write_src("dir/new.txt", b"brand new", T + 5);

    mirror_once(&fixture.roots, options(true, 0)).await;

    for relative in ["top.txt", "dir/mid.txt", "dir/new.txt"] {
        assert_eq!(
            std::fs::read(fixture.src(relative)).unwrap(),
            std::fs::read(fixture.dst(relative)).unwrap(),
            "content mismatch for {}",
            relative
        );
        assert_eq!(mtime(&fixture.src(relative)), mtime(&fixture.dst(relative)));
    }
}

#[tokio::test]
async fn recursion_gating_affects_only_top_level() {
    let fixture = MirrorFixture::new();
    fixture.write_src("top.txt", b"t", T);
    fixture.write_src("srcsub/inner.txt", b"i", T);
    fixture.write_dst("dstsub/orphan.txt", b"o", T);
    fixture.write_dst("orphan.txt", b"o", T);

    let metrics = mirror_once(&fixture.roots, options(false, 0)).await;

    assert!(fixture.dst("top.txt").exists());
    assert!(!fixture.dst("srcsub").exists());
    assert!(fixture.dst("dstsub/orphan.txt").exists());
    assert!(!fixture.dst("orphan.txt").exists());
    assert_eq!(metrics.files.directories_created, 0);
    assert_eq!(metrics.files.directories_removed, 0);
}

#[tokio::test]
async fn recursive_mirror_removes_orphaned_trees() {
    let fixture = MirrorFixture::new();
    fixture.write_src("kept/file.txt", b"k", T);
    fixture.write_dst("kept/file.txt", b"k", T);
    fixture.write_dst("kept/extra/deep/x.txt", b"x", T);
    fixture.write_dst("gone/y.txt", b"y", T);

    mirror_once(&fixture.roots, options(true, 0)).await;

    assert!(fixture.dst("kept/file.txt").exists());
    assert!(!fixture.dst("kept/extra").exists());
    assert!(!fixture.dst("gone").exists());
}

#[tokio::test]
async fn threshold_boundary_files_mirror_identically() {
    let fixture = MirrorFixture::new();
    let at_threshold: Vec<u8> = (0..1024u32).map(|i| (i * 7 % 256) as u8).collect();
    let below_threshold = at_threshold[..1023].to_vec();
    fixture.write_src("at.bin", &at_threshold, T);
    fixture.write_src("below.bin", &below_threshold, T);

    let metrics = mirror_once(&fixture.roots, options(false, 1024)).await;

    assert_eq!(std::fs::read(fixture.dst("at.bin")).unwrap(), at_threshold);
    assert_eq!(std::fs::read(fixture.dst("below.bin")).unwrap(), below_threshold);
    assert_eq!(metrics.files.mapped_copies, 1);
    assert_eq!(metrics.files.buffered_copies, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_source_file_fails_alone() {
    use std::os::unix::fs::PermissionsExt;

    // Root can read anything; the scenario only means something for other users.
    if running_as_root() {
        return;
    }

    let fixture = MirrorFixture::new();
    fixture.write_src("locked.txt", b"secret", T);
    fixture.write_src("open.txt", b"public", T);
    std::fs::set_permissions(fixture.src("locked.txt"), std::fs::Permissions::from_mode(0o000)).unwrap();

    let metrics = mirror_once(&fixture.roots, options(false, 0)).await;

    assert_eq!(std::fs::read(fixture.dst("open.txt")).unwrap(), b"public");
    assert!(!fixture.dst("locked.txt").exists());
    assert_eq!(metrics.files.failed, 1);
    assert_eq!(metrics.files.copied, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn read_only_file_is_updated_on_later_cycles() {
    use std::os::unix::fs::PermissionsExt;

    // Root can truncate a 0o444 file, so the replacement path never runs.
    if running_as_root() {
        return;
    }

    let fixture = MirrorFixture::new();
    let read_only = std::fs::Permissions::from_mode(0o444);
    fixture.write_src("ro.txt", b"v1", T);
    std::fs::set_permissions(fixture.src("ro.txt"), read_only.clone()).unwrap();

    let engine = SyncEngine::new(options(false, 0));
    let first = engine.run_cycle(&fixture.roots).await;
    assert_eq!(first.files.copied, 1);

    std::fs::set_permissions(fixture.src("ro.txt"), std::fs::Permissions::from_mode(0o644)).unwrap();
    fixture.write_src("ro.txt", b"v2 updated", T + 10);
    std::fs::set_permissions(fixture.src("ro.txt"), read_only).unwrap();

    let second = engine.run_cycle(&fixture.roots).await;

    assert!(second.is_successful(), "update failed: {}", second.summary());
    assert_eq!(second.files.copied, 1);
    assert_eq!(std::fs::read(fixture.dst("ro.txt")).unwrap(), b"v2 updated");
    assert_eq!(mtime(&fixture.dst("ro.txt")), mtime(&fixture.src("ro.txt")));
    assert_eq!(
        std::fs::metadata(fixture.dst("ro.txt")).unwrap().permissions().mode() & 0o777,
        0o444
    );
}

#[cfg(unix)]
fn running_as_root() -> bool {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self").map(|m| m.uid() == 0).unwrap_or(false)
}
