use std::fs;
use std::io::ErrorKind;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

pub const DEFAULT_RUNS_PER_DAY: NonZeroU32 = match NonZeroU32::new(3) {
    Some(runs) => runs,
    None => unreachable!(),
};
pub const DEFAULT_RETENTION_COUNT: usize = 12;

/// Operator settings. Built once at startup and threaded through every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub watched_data_path: PathBuf,
    /// Carried for the update script; nothing in the cycle reads it.
    pub steamcmd_path: PathBuf,
    pub backup_root_path: PathBuf,
    pub update_script_path: PathBuf,
    pub runs_per_day: NonZeroU32,
    pub retention_enabled: bool,
    pub retention_count: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watched_data_path: backup_utils::default_world_dir(),
            steamcmd_path: backup_utils::default_steamcmd_dir(),
            backup_root_path: backup_utils::default_backup_root(),
            update_script_path: backup_utils::default_update_script(),
            runs_per_day: DEFAULT_RUNS_PER_DAY,
            retention_enabled: false,
            retention_count: DEFAULT_RETENTION_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    WorldData,
    SteamCmd,
    BackupRoot,
    UpdateScript,
    RunsPerDay,
    DeleteOld,
    BackupCount,
}

// Population walks the keys in this order; a malformed line stops it at that key.
const KEYS: [(Key, &str); 7] = [
    (Key::WorldData, "Valheim"),
    (Key::SteamCmd, "SteamCMD"),
    (Key::BackupRoot, "Backup"),
    (Key::UpdateScript, "Update"),
    (Key::RunsPerDay, "Times"),
    (Key::DeleteOld, "Delete"),
    (Key::BackupCount, "Number"),
];

/// Load settings from `path`.
///
/// Never fails: a missing file yields defaults, an unreadable file yields defaults,
/// and a malformed directive abandons population leaving whatever was assigned so far.
pub fn load(path: &Path) -> Settings {
    let mut settings = Settings::default();

    let content = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("no config at {}, using defaults", path.display());
            return settings;
        }
        Err(source) => {
            let err = ConfigError::Io {
                path: path.to_path_buf(),
                source,
            };
            warn!("{err}; using defaults");
            return settings;
        }
    };

    info!("found config at {}", path.display());
    let lines = directive_lines(&content);
    for line in &lines {
        debug!("config: {line}");
    }

    if let Err(err) = populate(&lines, &mut settings) {
        warn!("config population abandoned: {err}; remaining keys keep defaults");
    }

    settings
}

fn directive_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

fn populate(lines: &[&str], settings: &mut Settings) -> Result<(), ConfigError> {
    for (key, prefix) in KEYS {
        let Some(line) = lines.iter().find(|line| line.starts_with(prefix)) else {
            continue;
        };
        let value = directive_value(line)?;
        apply(key, value, settings);
    }
    Ok(())
}

fn directive_value(line: &str) -> Result<&str, ConfigError> {
    let Some((_, value)) = line.split_once('=') else {
        return Err(ConfigError::MalformedLine {
            line: line.to_string(),
        });
    };
    Ok(value.trim_matches(|c: char| c.is_whitespace() || c == '"'))
}

fn apply(key: Key, value: &str, settings: &mut Settings) {
    match key {
        Key::WorldData => set_path(&mut settings.watched_data_path, value, "Valheim"),
        Key::SteamCmd => set_path(&mut settings.steamcmd_path, value, "SteamCMD"),
        Key::BackupRoot => set_path(&mut settings.backup_root_path, value, "Backup"),
        Key::UpdateScript => set_path(&mut settings.update_script_path, value, "Update"),
        Key::RunsPerDay => match value.parse::<u32>().ok().and_then(NonZeroU32::new) {
            Some(runs) => settings.runs_per_day = runs,
            None => warn!(
                "invalid runs per day {value:?}, keeping {}",
                settings.runs_per_day
            ),
        },
        Key::DeleteOld => settings.retention_enabled = value == "Y" || value == "1",
        Key::BackupCount => match value.parse::<usize>() {
            Ok(count) => settings.retention_count = count,
            Err(_) => warn!(
                "invalid backup count {value:?}, keeping {}",
                settings.retention_count
            ),
        },
    }
}

fn set_path(slot: &mut PathBuf, value: &str, key: &str) {
    if value.is_empty() {
        warn!("empty value for {key}, keeping {}", slot.display());
        return;
    }
    *slot = PathBuf::from(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Settings {
        let mut settings = Settings::default();
        let _ = populate(&directive_lines(content), &mut settings);
        settings
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = load(&dir.path().join("nope.config"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.runs_per_day.get(), 3);
        assert!(!settings.retention_enabled);
        assert_eq!(settings.retention_count, 12);
    }

    #[test]
    fn full_config_is_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("valheimservice.config");
        std::fs::write(
            &path,
            "# Valheim backup service\n\
             \n\
             ValheimDataPath = \"/srv/valheim/worlds\"\n\
             SteamCMDPath=/opt/steamcmd\n\
             BackupPath=\"/srv/backups\"\n\
             UpdateScript = /srv/valheim/update.sh\n\
             TimesPerDay=6\n\
             DeleteOldBackups=Y\n\
             NumberOfBackups=4\n",
        )
        .expect("write config");

        let settings = load(&path);
        assert_eq!(settings.watched_data_path, PathBuf::from("/srv/valheim/worlds"));
        assert_eq!(settings.steamcmd_path, PathBuf::from("/opt/steamcmd"));
        assert_eq!(settings.backup_root_path, PathBuf::from("/srv/backups"));
        assert_eq!(settings.update_script_path, PathBuf::from("/srv/valheim/update.sh"));
        assert_eq!(settings.runs_per_day.get(), 6);
        assert!(settings.retention_enabled);
        assert_eq!(settings.retention_count, 4);
    }

    #[test]
    fn absent_keys_keep_defaults() {
        let settings = parse("TimesPerDay=2\n");
        let defaults = Settings::default();
        assert_eq!(settings.runs_per_day.get(), 2);
        assert_eq!(settings.backup_root_path, defaults.backup_root_path);
        assert_eq!(settings.watched_data_path, defaults.watched_data_path);
        assert_eq!(settings.retention_count, defaults.retention_count);
    }

    #[test]
    fn first_matching_line_wins() {
        let settings = parse("BackupPath=/first\nBackupPath=/second\nTimes=4\nTimes=8\n");
        assert_eq!(settings.backup_root_path, PathBuf::from("/first"));
        assert_eq!(settings.runs_per_day.get(), 4);
    }

    #[test]
    fn comments_and_unknown_prefixes_are_ignored() {
        let settings = parse("#BackupPath=/commented\nbackuppath=/lowercase\nServerName=x\n");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn bad_numbers_keep_defaults() {
        for raw in ["abc", "0", "-2", "2.5", ""] {
            let settings = parse(&format!("TimesPerDay={raw}\nNumberOfBackups={raw}\n"));
            assert_eq!(settings.runs_per_day, DEFAULT_RUNS_PER_DAY, "times {raw:?}");
            if raw != "0" {
                assert_eq!(settings.retention_count, DEFAULT_RETENTION_COUNT, "number {raw:?}");
            }
        }
        // zero is a valid retention cap
        assert_eq!(parse("NumberOfBackups=0\n").retention_count, 0);
    }

    #[test]
    fn delete_flag_is_exact_match() {
        assert!(parse("Delete=Y\n").retention_enabled);
        assert!(parse("Delete = \"1\"\n").retention_enabled);
        assert!(!parse("Delete=y\n").retention_enabled);
        assert!(!parse("Delete=yes\n").retention_enabled);
        assert!(!parse("Delete=true\n").retention_enabled);
    }

    #[test]
    fn malformed_line_abandons_remaining_keys() {
        let settings = parse("BackupPath=/kept\nTimesPerDay 6\nNumberOfBackups=2\nDelete=Y\n");
        assert_eq!(settings.backup_root_path, PathBuf::from("/kept"));
        assert_eq!(settings.runs_per_day, DEFAULT_RUNS_PER_DAY);
        assert!(!settings.retention_enabled);
        assert_eq!(settings.retention_count, DEFAULT_RETENTION_COUNT);
    }

    #[test]
    fn malformed_config_file_still_loads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("valheimservice.config");
        std::fs::write(&path, "ValheimData\nTimes=zzz\n").expect("write config");
        let settings = load(&path);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn value_keeps_text_after_first_equals() {
        let settings = parse("BackupPath=/srv/a=b\n");
        assert_eq!(settings.backup_root_path, PathBuf::from("/srv/a=b"));
    }

    #[test]
    fn empty_path_value_keeps_default() {
        let settings = parse("BackupPath=\"\"\n");
        assert_eq!(settings.backup_root_path, Settings::default().backup_root_path);
    }
}
