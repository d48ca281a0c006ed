//! Config file discovery and loading.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use zbackup_engine::{BackupConfig, BackupError};

/// Errors raised while loading the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No `--config` given and the platform has no config directory.
    #[error("no config directory on this platform; pass --config")]
    NoConfigDir,

    /// The file could not be read.
    #[error("failed to read config {path}: {error}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        error: std::io::Error,
    },

    /// The file is not valid config JSON.
    #[error("failed to parse config {path}: {error}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying error.
        error: serde_json::Error,
    },

    /// The config parsed but cannot drive a replication.
    #[error(transparent)]
    Invalid(#[from] BackupError),
}

/// Default config location: `<config dir>/zbackup/config.json`.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("zbackup").join("config.json"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Reads and validates the config at `path`.
pub fn load(path: &Path) -> Result<BackupConfig, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let raw = fs::read_to_string(path).map_err(|error| ConfigError::Read {
        path: path.to_path_buf(),
        error,
    })?;
    let config: BackupConfig = serde_json::from_str(&raw).map_err(|error| ConfigError::Parse {
        path: path.to_path_buf(),
        error,
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads `explicit` if given, otherwise the default location.
pub fn resolve(explicit: Option<&Path>) -> Result<BackupConfig, ConfigError> {
    match explicit {
        Some(path) => load(path),
        None => load(&default_path()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_config_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, r#"{"zfs_pool":"tank","zfs_backup_pool":"usb/tank"}"#);

        let config = resolve(Some(&path)).unwrap();
        assert_eq!(config.primary, "tank");
        assert_eq!(config.backup, "usb/tank");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, r#"{"zfs_pool": "tank""#);
        assert!(matches!(load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn same_pool_twice_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, r#"{"zfs_pool":"tank","zfs_backup_pool":"tank"}"#);
        assert!(matches!(load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn default_path_ends_with_app_dir() {
        if let Ok(path) = default_path() {
            assert!(path.ends_with("zbackup/config.json"));
        }
    }
}
