//! WolfGrid Settings
//!
//! The settings document tells the tool where the sites document lives,
//! where generated configs go, and which external programs to run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::integrity::SETTINGS_LATEST_VERSION;
use crate::report::Report;
use crate::storage::Storage;

/// Persisted settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Settings document version
    #[serde(default = "default_file_version")]
    pub file_version: String,

    /// 0 = warnings, 1 = info, 2 = debug, 3+ = trace
    #[serde(default)]
    pub verbosity: u8,

    /// Path of the sites document
    #[serde(default = "default_sites_file_path")]
    pub sites_file_path: PathBuf,

    /// Directory that receives one subdirectory of configs per site
    #[serde(default = "default_wg_config_path")]
    pub wg_config_path: PathBuf,

    /// Editor command for connection tables
    #[serde(default = "default_editor")]
    pub editor: String,

    /// WireGuard tool used to issue keys
    #[serde(default = "default_wg_executable")]
    pub wg_executable: String,
}

// Default value functions
fn default_file_version() -> String {
    SETTINGS_LATEST_VERSION.to_string()
}

fn default_sites_file_path() -> PathBuf {
    PathBuf::from("./sites.json")
}

fn default_wg_config_path() -> PathBuf {
    PathBuf::from("./wg")
}

fn default_editor() -> String {
    "editor".to_string()
}

fn default_wg_executable() -> String {
    "wg".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            file_version: default_file_version(),
            verbosity: 0,
            sites_file_path: default_sites_file_path(),
            wg_config_path: default_wg_config_path(),
            editor: default_editor(),
            wg_executable: default_wg_executable(),
        }
    }
}

impl Settings {
    /// Load settings through `storage`; a missing document yields defaults
    pub fn load(storage: &dyn Storage, path: &Path) -> crate::Result<(Self, Report)> {
        let text = storage.read(path)?;
        crate::integrity::load_settings(&text)
    }

    /// Write settings through `storage`
    pub fn save(&self, storage: &dyn Storage, path: &Path) -> crate::Result<()> {
        storage.write(path, &serde_json::to_string_pretty(self)?)
    }

    /// Log filter directive for the configured verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Output directory for the configs of one site
    pub fn site_config_dir(&self, site: &str) -> PathBuf {
        self.wg_config_path.join(site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_settings_round_trip() {
        let storage = MemoryStorage::new();
        let path = Path::new("settings.json");

        let (missing, report) = Settings::load(&storage, path).unwrap();
        assert_eq!(missing, Settings::default());
        assert!(report.is_empty());

        let settings = Settings {
            verbosity: 2,
            editor: "vim".into(),
            ..Default::default()
        };
        settings.save(&storage, path).unwrap();

        let (loaded, report) = Settings::load(&storage, path).unwrap();
        assert_eq!(loaded, settings);
        assert!(report.is_success(true));
        assert_eq!(loaded.log_level(), "debug");
    }

    #[test]
    fn test_site_config_dir() {
        let settings = Settings::default();
        assert_eq!(settings.site_config_dir("hq"), PathBuf::from("./wg/hq"));
    }
}
