use std::path::{Path, PathBuf};

pub struct RuntimePaths {
    pub runtime_dir: PathBuf,
    pub lock_path: PathBuf,
}

/// Runtime namespace so a second copy of the daemon finds the same lock.
const APP_ID: &str = "valheim-backupd";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/valheim-backup/valheimservice.config";

pub fn runtime_paths() -> RuntimePaths {
    // Linux: prefer XDG_RUNTIME_DIR if present.
    if let Some(xdg) = std::env::var_os("XDG_RUNTIME_DIR") {
        return mk(PathBuf::from(xdg).join(APP_ID));
    }

    if let Some(tmp) = std::env::var_os("TMPDIR") {
        return mk(PathBuf::from(tmp).join(APP_ID));
    }

    mk(std::env::temp_dir().join(APP_ID))
}

fn mk(runtime_dir: PathBuf) -> RuntimePaths {
    RuntimePaths {
        lock_path: runtime_dir.join("backupd.lock"),
        runtime_dir,
    }
}

/// Directory holding the flat operational log (`log.txt`).
pub fn service_dir() -> PathBuf {
    if let Some(base) = dirs::data_dir() {
        return base.join("valheim-backup");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".valheim-backup");
    }
    PathBuf::from("valheim-backup")
}

/// Where a Linux dedicated server keeps its worlds.
pub fn default_world_dir() -> PathBuf {
    match dirs::config_dir() {
        Some(base) => base.join("unity3d").join("IronGate").join("Valheim"),
        None => PathBuf::from("unity3d").join("IronGate").join("Valheim"),
    }
}

pub fn default_backup_root() -> PathBuf {
    service_dir().join("backups")
}

pub fn default_steamcmd_dir() -> PathBuf {
    home_or_relative().join("steamcmd")
}

pub fn default_update_script() -> PathBuf {
    home_or_relative().join("valheim").join("update.sh")
}

fn home_or_relative() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn ensure_dir(p: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(p)
}
