use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::SnapshotError;

pub const SNAPSHOT_PREFIX: &str = "Backup";

/// One timestamped backup folder directly under the backup root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDirectory {
    pub name: String,
    pub path: PathBuf,
}

/// Result of a finished snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub dir: SnapshotDirectory,
    pub files_copied: u64,
    pub bytes_copied: u64,
}

/// `Backup-dd-MM-yyyy-(HH-mm-ss)` for the given wall-clock time.
pub fn snapshot_name(at: NaiveDateTime) -> String {
    format!("{SNAPSHOT_PREFIX}{}", at.format("-%d-%m-%Y-(%H-%M-%S)"))
}

/// Copy the watched tree into a fresh snapshot directory under `backup_root`.
///
/// A missing watched path still leaves an empty snapshot directory behind.
/// If a directory with the same name already exists the new one gets a `-2`, `-3`, ... suffix.
pub fn snapshot(
    watched: &Path,
    backup_root: &Path,
    at: NaiveDateTime,
) -> Result<Snapshot, SnapshotError> {
    fs::create_dir_all(backup_root).map_err(|source| SnapshotError::CreateRoot {
        path: backup_root.to_path_buf(),
        source,
    })?;

    let dir = create_destination(backup_root, &snapshot_name(at))?;
    info!("creating snapshot {}", dir.path.display());

    let mut snapshot = Snapshot {
        dir,
        files_copied: 0,
        bytes_copied: 0,
    };

    if !watched.is_dir() {
        warn!(
            "watched data {} does not exist; snapshot {} left empty",
            watched.display(),
            snapshot.dir.name
        );
        return Ok(snapshot);
    }

    let (files, bytes) = copy_tree(watched, &snapshot.dir.path)?;
    snapshot.files_copied = files;
    snapshot.bytes_copied = bytes;
    info!(
        files,
        bytes,
        "snapshot {} complete",
        snapshot.dir.name
    );
    Ok(snapshot)
}

fn create_destination(root: &Path, base: &str) -> Result<SnapshotDirectory, SnapshotError> {
    let mut name = base.to_string();
    let mut suffix = 1u32;
    loop {
        let path = root.join(&name);
        match fs::create_dir(&path) {
            Ok(()) => return Ok(SnapshotDirectory { name, path }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                suffix += 1;
                debug!("{} already exists, trying suffix {suffix}", path.display());
                name = format!("{base}-{suffix}");
            }
            Err(source) => return Err(SnapshotError::CreateDir { path, source }),
        }
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(u64, u64), SnapshotError> {
    let mut files = 0u64;
    let mut bytes = 0u64;

    // links are followed; walkdir errors on loops
    for entry in WalkDir::new(src).min_depth(1).follow_links(true) {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|source| SnapshotError::CreateDir {
                path: target.clone(),
                source,
            })?;
        } else if file_type.is_file() {
            bytes += copy_new(entry.path(), &target)?;
            files += 1;
        } else {
            debug!("skipping special file {}", entry.path().display());
        }
    }

    Ok((files, bytes))
}

/// Copy a single file, refusing to replace anything already at `to`.
fn copy_new(from: &Path, to: &Path) -> Result<u64, SnapshotError> {
    let copy_err = |source: io::Error| SnapshotError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let mut reader = File::open(from).map_err(copy_err)?;
    let mut writer = match OpenOptions::new().write(true).create_new(true).open(to) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Err(SnapshotError::AlreadyExists(to.to_path_buf()));
        }
        Err(err) => return Err(copy_err(err)),
    };
    io::copy(&mut reader, &mut writer).map_err(copy_err)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .expect("valid timestamp")
    }

    fn relative_files(root: &Path) -> BTreeSet<PathBuf> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path().strip_prefix(root).expect("under root").to_path_buf())
            .collect()
    }

    fn seed_world(dir: &Path) {
        fs::create_dir_all(dir.join("worlds_local")).expect("create worlds dir");
        fs::create_dir_all(dir.join("characters_local").join("old")).expect("create chars dir");
        fs::write(dir.join("worlds_local").join("Dedicated.db"), b"world-bytes").expect("write db");
        fs::write(dir.join("worlds_local").join("Dedicated.fwl"), b"meta").expect("write fwl");
        fs::write(dir.join("characters_local").join("old").join("viking.fch"), b"c")
            .expect("write fch");
        fs::write(dir.join("prefs"), b"p").expect("write prefs");
    }

    #[test]
    fn name_uses_day_month_year_and_24_hour_clock() {
        assert_eq!(snapshot_name(at(14, 3, 5)), "Backup-19-10-2026-(14-03-05)");
        assert_eq!(snapshot_name(at(2, 3, 5)), "Backup-19-10-2026-(02-03-05)");
    }

    #[test]
    fn snapshot_mirrors_nested_tree() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let watched = tmp.path().join("Valheim");
        let root = tmp.path().join("backups");
        seed_world(&watched);

        let snap = snapshot(&watched, &root, at(9, 0, 0)).expect("snapshot");

        assert_eq!(snap.dir.name, "Backup-19-10-2026-(09-00-00)");
        assert_eq!(snap.dir.path, root.join(&snap.dir.name));
        assert_eq!(relative_files(&watched), relative_files(&snap.dir.path));
        assert_eq!(snap.files_copied, 4);
        assert_eq!(snap.bytes_copied, 11 + 4 + 1 + 1);
        assert_eq!(
            fs::read(snap.dir.path.join("worlds_local").join("Dedicated.db")).expect("read copy"),
            b"world-bytes"
        );
    }

    #[test]
    fn missing_watched_path_leaves_empty_snapshot() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("not-yet").join("backups");

        let snap = snapshot(&tmp.path().join("absent"), &root, at(9, 0, 0)).expect("snapshot");

        assert!(snap.dir.path.is_dir());
        assert_eq!(snap.files_copied, 0);
        assert!(relative_files(&snap.dir.path).is_empty());
    }

    #[test]
    fn same_second_collision_gets_suffix() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let watched = tmp.path().join("Valheim");
        let root = tmp.path().join("backups");
        seed_world(&watched);

        let first = snapshot(&watched, &root, at(9, 0, 0)).expect("first");
        let second = snapshot(&watched, &root, at(9, 0, 0)).expect("second");
        let third = snapshot(&watched, &root, at(9, 0, 0)).expect("third");

        assert_eq!(first.dir.name, "Backup-19-10-2026-(09-00-00)");
        assert_eq!(second.dir.name, "Backup-19-10-2026-(09-00-00)-2");
        assert_eq!(third.dir.name, "Backup-19-10-2026-(09-00-00)-3");
        assert_eq!(relative_files(&first.dir.path), relative_files(&second.dir.path));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_world_dir_is_copied_through() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let disk = tmp.path().join("bigdisk").join("worlds");
        fs::create_dir_all(&disk).expect("create link target");
        fs::write(disk.join("Dedicated.db"), b"world-bytes").expect("write db");
        let watched = tmp.path().join("Valheim");
        fs::create_dir_all(&watched).expect("create watched");
        fs::write(watched.join("prefs"), b"p").expect("write prefs");
        std::os::unix::fs::symlink(&disk, watched.join("worlds_local")).expect("symlink worlds");
        std::os::unix::fs::symlink(watched.join("prefs"), watched.join("prefs.lnk"))
            .expect("symlink file");

        let snap = snapshot(&watched, &tmp.path().join("backups"), at(9, 0, 0)).expect("snapshot");

        let copied_db = snap.dir.path.join("worlds_local").join("Dedicated.db");
        assert_eq!(fs::read(&copied_db).expect("world file in backup"), b"world-bytes");
        assert!(!fs::symlink_metadata(snap.dir.path.join("worlds_local"))
            .expect("copied dir")
            .file_type()
            .is_symlink());
        assert_eq!(fs::read(snap.dir.path.join("prefs.lnk")).expect("linked file"), b"p");
        assert_eq!(snap.files_copied, 3);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_fails_the_snapshot() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let watched = tmp.path().join("Valheim");
        fs::create_dir_all(watched.join("worlds_local")).expect("create watched");
        std::os::unix::fs::symlink(&watched, watched.join("worlds_local").join("loop"))
            .expect("symlink loop");

        let err = snapshot(&watched, &tmp.path().join("backups"), at(9, 0, 0))
            .expect_err("loop should fail");
        assert!(matches!(err, SnapshotError::Walk(_)));
    }

    #[test]
    fn copy_refuses_to_overwrite_existing_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let watched = tmp.path().join("Valheim");
        let dst = tmp.path().join("dst");
        seed_world(&watched);
        fs::create_dir_all(&dst).expect("create dst");
        fs::write(dst.join("prefs"), b"already here").expect("write existing");

        let err = copy_tree(&watched, &dst).expect_err("collision expected");
        assert!(matches!(err, SnapshotError::AlreadyExists(ref path) if path == &dst.join("prefs")));
        assert_eq!(fs::read(dst.join("prefs")).expect("read existing"), b"already here");
    }
}
