use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::process;

use fs2::FileExt;

/// Held for the life of the daemon so two instances never write the same backup root.
///
/// The lock file carries the holder's pid so a refused second instance can name it.
pub struct LockGuard {
    _file: File,
}

pub fn acquire_lock(path: &Path) -> io::Result<LockGuard> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;

    // truncate only once the lock is ours, the loser must not wipe the holder's pid
    file.try_lock_exclusive()?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", process::id())?;
    file.flush()?;
    Ok(LockGuard { _file: file })
}

/// Pid recorded by the current holder, if the lock file names one.
pub fn holder_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Describe a refused lock for the operator.
pub fn held_by(path: &Path) -> String {
    match holder_pid(path) {
        Some(pid) => format!("lock held by pid {pid}"),
        None => "lock held".to_string(),
    }
}
