//! Configuration loading and management.

use std::path::{Path, PathBuf};

use aw_datastore::StorageKind;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the datastore and device identity.
    pub data_dir: PathBuf,
    /// Storage backend.
    pub storage: StorageKind,
    /// Use a separate store under `<data_dir>/testing`.
    pub testing: bool,
    /// Whether buckets may be deleted.
    pub allow_bucket_delete: bool,
    /// Whether heartbeats to missing buckets create them.
    pub auto_create_buckets: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs_data_path().unwrap_or_else(|| PathBuf::from(".")),
            storage: StorageKind::default(),
            testing: false,
            allow_bucket_delete: true,
            auto_create_buckets: false,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, `<config_dir>/aw-server/config.toml`,
    /// `config_path`, then `AW_*` environment variables.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // AW_DATA_DIR, AW_STORAGE, ...
        figment = figment.merge(Env::prefixed("AW_"));

        figment.extract()
    }

    /// Directory the datastore actually lives in.
    ///
    /// Testing mode keeps its data apart from the real store.
    pub fn effective_data_dir(&self) -> PathBuf {
        if self.testing {
            self.data_dir.join("testing")
        } else {
            self.data_dir.clone()
        }
    }
}

/// Returns the platform-specific config directory.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("aw-server"))
}

/// Returns the platform-specific data directory.
///
/// On Linux: `~/.local/share/aw-server`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("aw-server"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_aw_server() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "aw-server");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage, StorageKind::Sqlite);
        assert!(config.allow_bucket_delete);
        assert!(!config.auto_create_buckets);
        assert!(!config.testing);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        let data_dir = temp.path().join("data");
        std::fs::write(
            &path,
            format!(
                "data_dir = {:?}\nstorage = \"files\"\nallow_bucket_delete = false\n",
                data_dir.display().to_string()
            ),
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.data_dir, data_dir);
        assert_eq!(config.storage, StorageKind::Files);
        assert!(!config.allow_bucket_delete);
    }

    #[test]
    fn test_unknown_storage_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "storage = \"mongodb\"\n").unwrap();

        assert!(Config::load_from(Some(&path)).is_err());
    }

    #[test]
    fn test_testing_mode_uses_separate_dir() {
        let config = Config {
            data_dir: PathBuf::from("/data"),
            testing: true,
            ..Config::default()
        };
        assert_eq!(config.effective_data_dir(), PathBuf::from("/data/testing"));
    }
}
