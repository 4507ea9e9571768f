//! Settings loading and management
//!
//! Handles parsing of the `bootcfg.toml` settings file. Every field has a
//! default matching the stock Raspberry Pi layout, so a missing file is
//! equivalent to an empty one.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/bootcfg.toml";

/// Placeholder substituted by the hardware model in `backup_template`
const MODEL_PLACEHOLDER: &str = "{model}";

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// The live boot configuration
    #[serde(default = "default_target_path")]
    pub target_path: PathBuf,

    /// Per-model backup path, `{model}` is replaced by the normalized model
    #[serde(default = "default_backup_template")]
    pub backup_template: String,

    /// Packaged document used when the target is missing or corrupt
    #[serde(default = "default_config_path")]
    pub default_config_path: PathBuf,

    /// Volatile directory holding lock files
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// Prefix for lock file names
    #[serde(default = "default_lock_prefix")]
    pub lock_prefix: String,

    /// How long to wait for another process to release the lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Substrings that must each appear in a healthy config
    #[serde(default = "default_required_markers")]
    pub required_markers: Vec<String>,

    /// Line written by NOOBS before its auto-generated settings
    #[serde(default = "default_noobs_sentinel")]
    pub noobs_sentinel: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_path: default_target_path(),
            backup_template: default_backup_template(),
            default_config_path: default_config_path(),
            lock_dir: default_lock_dir(),
            lock_prefix: default_lock_prefix(),
            lock_timeout_ms: default_lock_timeout_ms(),
            required_markers: default_required_markers(),
            noobs_sentinel: default_noobs_sentinel(),
        }
    }
}

fn default_target_path() -> PathBuf {
    PathBuf::from("/boot/config.txt")
}

fn default_backup_template() -> String {
    "/boot/config_{model}_backup.txt".to_string()
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/usr/share/kano-settings/boot_default/config.txt")
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("/run/lock")
}

fn default_lock_prefix() -> String {
    "kano_config_".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_required_markers() -> Vec<String> {
    vec!["dtparam".to_string()]
}

fn default_noobs_sentinel() -> String {
    "# NOOBS Auto-generated Settings:".to_string()
}

impl Settings {
    /// Load settings from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file, or return defaults
    ///
    /// An unreadable or invalid file is reported and then ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring invalid settings");
                Self::default()
            }
        }
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Backup config path for a hardware model, e.g. `RPi 3` -> `config_rpi3_backup.txt`
    pub fn backup_path_for_model(&self, model: &str) -> PathBuf {
        let model: String = model
            .chars()
            .filter(|c| !matches!(c, '-' | '/' | ' '))
            .collect::<String>()
            .to_lowercase();
        PathBuf::from(self.backup_template.replace(MODEL_PLACEHOLDER, &model))
    }

    fn validate(&self) -> Result<()> {
        if self.target_path.file_name().is_none() {
            return Err(Error::InvalidSettings(format!(
                "target_path has no file name: {}",
                self.target_path.display()
            )));
        }
        if !self.backup_template.contains(MODEL_PLACEHOLDER) {
            return Err(Error::InvalidSettings(format!(
                "backup_template must contain {MODEL_PLACEHOLDER}"
            )));
        }
        if self.noobs_sentinel.trim().is_empty() {
            return Err(Error::InvalidSettings(
                "noobs_sentinel cannot be empty".to_string(),
            ));
        }
        if self.required_markers.iter().any(|m| m.is_empty()) {
            return Err(Error::InvalidSettings(
                "required_markers cannot contain empty entries".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_match_stock_layout() {
        let settings = Settings::default();
        assert_eq!(settings.target_path, PathBuf::from("/boot/config.txt"));
        assert_eq!(settings.lock_timeout_ms, 5000);
        assert_eq!(settings.required_markers, vec!["dtparam".to_string()]);
    }

    #[test]
    fn backup_path_normalizes_model() {
        let settings = Settings::default();
        assert_eq!(
            settings.backup_path_for_model("RPi 3-B/Plus"),
            PathBuf::from("/boot/config_rpi3bplus_backup.txt")
        );
    }

    #[test]
    fn load_reads_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bootcfg.toml");
        fs::write(&path, "lock_timeout_ms = 250\nlock_dir = \"/tmp/locks\"").expect("write");

        let settings = Settings::load(&path).expect("load");
        assert_eq!(settings.lock_timeout_ms, 250);
        assert_eq!(settings.lock_dir, PathBuf::from("/tmp/locks"));
        assert_eq!(settings.lock_prefix, "kano_config_");
    }

    #[test]
    fn load_rejects_template_without_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bootcfg.toml");
        fs::write(&path, "backup_template = \"/boot/backup.txt\"").expect("write");

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidSettings(_)));
    }

    #[test]
    fn load_or_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(settings.noobs_sentinel, "# NOOBS Auto-generated Settings:");
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        let mut settings = Settings::default();
        settings.lock_timeout_ms = 42;
        settings.save(&path).expect("save");

        let loaded = Settings::load(&path).expect("reload");
        assert_eq!(loaded.lock_timeout_ms, 42);
    }
}
