#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use bootcfg::settings::Settings;
use bootcfg::transaction::STAGED_PREFIX;
use tempfile::TempDir;

pub const SAMPLE_CONFIG: &str = "\
# For more options and information see
# http://rpf.io/configtxt

#disable_overscan=1
hdmi_group=1
hdmi_mode=4
dtparam=audio=on
";

pub const DEFAULT_CONFIG: &str = "\
# packaged default
dtparam=audio=on
gpu_mem=128
";

/// A throwaway boot partition with its own lock dir and packaged default
pub struct TestBoot {
    dir: TempDir,
}

impl TestBoot {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        fs::create_dir_all(dir.path().join("boot")).expect("create boot dir");
        fs::write(dir.path().join("default.txt"), DEFAULT_CONFIG).expect("write default");
        Self { dir }
    }

    pub fn with_target(contents: &str) -> Self {
        let boot = Self::new();
        boot.write_target(contents);
        boot
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn boot_dir(&self) -> PathBuf {
        self.dir.path().join("boot")
    }

    pub fn target(&self) -> PathBuf {
        self.boot_dir().join("config.txt")
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.dir.path().join("lock")
    }

    pub fn default_path(&self) -> PathBuf {
        self.dir.path().join("default.txt")
    }

    pub fn write_target(&self, contents: &str) {
        fs::write(self.target(), contents).expect("write target");
    }

    pub fn read_target(&self) -> String {
        fs::read_to_string(self.target()).expect("read target")
    }

    pub fn settings(&self) -> Settings {
        self.settings_with_timeout(2000)
    }

    pub fn settings_with_timeout(&self, lock_timeout_ms: u64) -> Settings {
        Settings {
            target_path: self.target(),
            backup_template: self
                .boot_dir()
                .join("config_{model}_backup.txt")
                .display()
                .to_string(),
            default_config_path: self.default_path(),
            lock_dir: self.lock_dir(),
            lock_timeout_ms,
            ..Settings::default()
        }
    }

    pub fn write_settings_file(&self, lock_timeout_ms: u64) -> PathBuf {
        let path = self.dir.path().join("bootcfg.toml");
        self.settings_with_timeout(lock_timeout_ms)
            .save(&path)
            .expect("write settings");
        path
    }

    pub fn lock_path(&self) -> PathBuf {
        self.lock_dir().join("kano_config_config.txt.lock")
    }

    pub fn staged_files(&self) -> Vec<PathBuf> {
        let mut staged: Vec<PathBuf> = fs::read_dir(self.boot_dir())
            .expect("read boot dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().starts_with(STAGED_PREFIX))
                    .unwrap_or(false)
            })
            .collect();
        staged.sort();
        staged
    }
}
