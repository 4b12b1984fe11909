use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use tracing::{debug, info};

use crate::errors::RetentionError;
use crate::snapshot::SnapshotDirectory;

/// Delete the oldest directories under `backup_root` until at most `keep` remain.
///
/// Every immediate subdirectory counts, ordered by last-write time. Ties keep
/// enumeration order. The first failed delete stops pruning for this call.
pub fn prune(backup_root: &Path, keep: usize) -> Result<Vec<SnapshotDirectory>, RetentionError> {
    prune_with(backup_root, keep, |path| fs::remove_dir_all(path))
}

fn prune_with<F>(
    backup_root: &Path,
    keep: usize,
    mut remove: F,
) -> Result<Vec<SnapshotDirectory>, RetentionError>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let mut dirs = list_snapshot_dirs(backup_root)?;
    dirs.sort_by_key(|(modified, _)| *modified);

    if dirs.len() <= keep {
        debug!("retention: {} snapshots, cap {keep}, nothing to prune", dirs.len());
        return Ok(Vec::new());
    }

    let excess = dirs.len() - keep;
    let mut evicted = Vec::with_capacity(excess);
    for (_, dir) in dirs.into_iter().take(excess) {
        remove(&dir.path).map_err(|source| RetentionError::Remove {
            path: dir.path.clone(),
            source,
        })?;
        info!("retention: removed {}", dir.path.display());
        evicted.push(dir);
    }

    Ok(evicted)
}

fn list_snapshot_dirs(
    backup_root: &Path,
) -> Result<Vec<(SystemTime, SnapshotDirectory)>, RetentionError> {
    let read_root = |source| RetentionError::ReadRoot {
        path: backup_root.to_path_buf(),
        source,
    };

    let mut dirs = Vec::new();
    for entry in fs::read_dir(backup_root).map_err(read_root)? {
        let entry = entry.map_err(read_root)?;
        let path = entry.path();
        let metadata = entry.metadata().map_err(|source| RetentionError::Metadata {
            path: path.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            continue;
        }
        let modified = metadata.modified().map_err(|source| RetentionError::Metadata {
            path: path.clone(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        dirs.push((modified, SnapshotDirectory { name, path }));
    }
    Ok(dirs)
}
