//! Config transactions
//!
//! A [`ConfigTransaction`] ensures that only one process edits a given
//! config file at a time. A transaction starts with the first read or write
//! and ends with [`commit`](ConfigTransaction::commit) or
//! [`abort`](ConfigTransaction::abort).
//!
//! ```text
//!   Idle ──read──▶ Locked ──write──▶ Writable
//!    ▲                │                 │
//!    └──commit/abort──┴─────────────────┘
//! ```
//!
//! - `Idle`: no lock, reads go to the live file.
//! - `Locked`: lock held in the volatile lock dir, reads go to the live file.
//! - `Writable`: lock held, a staged copy beside the live file receives all
//!   reads and writes. Commit renames it over the live file, fsyncs the
//!   directory, then syncs filesystems.

use std::fs::{self, File};
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::accessor::{self, BootConfig, Lookup};
use crate::document::Filter;
use crate::error::{Error, Result};
use crate::lock::{lock_path_for, FileLock};
use crate::settings::Settings;

/// Document used when neither the target nor the packaged default exist
pub const BUILTIN_DEFAULT_CONFIG: &str = include_str!("../assets/default_config.txt");

/// Prefix of staged copies created next to the target
pub const STAGED_PREFIX: &str = "config_tmp_";

/// Mode of a config written from the built-in document when no target exists
#[cfg(unix)]
const DEFAULT_FILE_MODE: u32 = 0o644;

/// Transaction state, carrying exactly the resources valid in it
#[derive(Debug, Default)]
enum TxState {
    #[default]
    Idle,
    Locked {
        lock: FileLock,
    },
    Writable {
        lock: FileLock,
        staged: PathBuf,
    },
}

/// Result of ending a transaction with [`ConfigTransaction::commit`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "staged", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// Nothing was staged; the target is untouched
    NoChanges,
    /// The staged copy replaced the target
    Committed,
    /// Dry run: the staged copy was kept at this path
    DryRun(PathBuf),
}

/// A transaction over a single config file
#[derive(Debug)]
pub struct ConfigTransaction {
    path: PathBuf,
    dir: PathBuf,
    lock_path: PathBuf,
    lock_timeout_ms: u64,
    default_config_path: PathBuf,
    required_markers: Vec<String>,
    noobs_sentinel: String,
    dry_run: bool,
    state: TxState,
}

impl ConfigTransaction {
    pub fn new(path: impl Into<PathBuf>, settings: &Settings) -> Self {
        let path = path.into();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let lock_path = lock_path_for(&settings.lock_dir, &settings.lock_prefix, &path);

        Self {
            path,
            dir,
            lock_path,
            lock_timeout_ms: settings.lock_timeout_ms,
            default_config_path: settings.default_config_path.clone(),
            required_markers: settings.required_markers.clone(),
            noobs_sentinel: settings.noobs_sentinel.clone(),
            dry_run: false,
            state: TxState::Idle,
        }
    }

    /// The live file this transaction manages
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// 0 = idle, 1 = locked, 2 = writable
    pub fn state_level(&self) -> u8 {
        match self.state {
            TxState::Idle => 0,
            TxState::Locked { .. } => 1,
            TxState::Writable { .. } => 2,
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.state, TxState::Writable { .. })
    }

    pub fn staged_path(&self) -> Option<&Path> {
        match &self.state {
            TxState::Writable { staged, .. } => Some(staged),
            TxState::Idle | TxState::Locked { .. } => None,
        }
    }

    /// Keep staged copies on commit instead of replacing the target
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Accessor for whichever file currently backs the transaction
    fn config(&self) -> BootConfig {
        BootConfig::new(self.staged_path().unwrap_or(self.path.as_path()))
    }

    pub fn raise_to_locked(&mut self) -> Result<()> {
        if let TxState::Idle = self.state {
            let lock = FileLock::acquire(&self.lock_path, self.lock_timeout_ms)?;
            self.state = TxState::Locked { lock };
        }
        Ok(())
    }

    pub fn raise_to_writable(&mut self) -> Result<()> {
        self.raise_to_locked()?;
        if let TxState::Locked { .. } = self.state {
            let staged = self.stage()?;
            self.state = match mem::take(&mut self.state) {
                TxState::Locked { lock } => TxState::Writable { lock, staged },
                other => other,
            };
        }
        Ok(())
    }

    /// Create the staged copy, seeded from the target or the default document
    fn stage(&self) -> Result<PathBuf> {
        let (file, staged) = tempfile::Builder::new()
            .prefix(STAGED_PREFIX)
            .tempfile_in(&self.dir)?
            .keep()
            .map_err(|err| err.error)?;
        drop(file);

        tracing::info!(staged = %staged.display(), "enabling modifications in config transaction");

        let seeded = if self.path.exists() {
            fs::copy(&self.path, &staged)
                .map(|_| ())
                .map_err(Error::from)
        } else {
            tracing::warn!(
                path = %self.path.display(),
                "could not copy config, staging the default document"
            );
            self.install_default(&staged)
        };

        if let Err(err) = seeded {
            let _ = fs::remove_file(&staged);
            return Err(err);
        }
        Ok(staged)
    }

    /// Overwrite `dest` with the packaged default document
    fn install_default(&self, dest: &Path) -> Result<()> {
        if self.default_config_path.exists() {
            fs::copy(&self.default_config_path, dest)?;
        } else {
            tracing::warn!(
                path = %self.default_config_path.display(),
                "packaged default missing, using built-in document"
            );
            fs::write(dest, BUILTIN_DEFAULT_CONFIG)?;
            self.apply_target_mode(dest)?;
        }
        File::open(dest)?.sync_all()?;
        Ok(())
    }

    /// Give `dest` the target's mode, or 0644 when there is no target
    ///
    /// Staged files are created private, which must not leak into the target.
    #[cfg(unix)]
    fn apply_target_mode(&self, dest: &Path) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let perms = fs::metadata(&self.path)
            .map(|meta| meta.permissions())
            .unwrap_or_else(|_| fs::Permissions::from_mode(DEFAULT_FILE_MODE));
        fs::set_permissions(dest, perms)
    }

    #[cfg(not(unix))]
    fn apply_target_mode(&self, _dest: &Path) -> io::Result<()> {
        Ok(())
    }

    pub fn get_config_value(
        &mut self,
        name: &str,
        filter: &Filter,
        fallback: bool,
        ignore_comments: bool,
    ) -> Result<Lookup> {
        self.raise_to_locked()?;
        self.config()
            .get_value(name, filter, fallback, ignore_comments)
    }

    pub fn set_config_value(&mut self, name: &str, value: Option<&str>, filter: &Filter) -> Result<()> {
        accessor::check_entry(name, value)?;
        self.raise_to_writable()?;
        self.config().set_value(name, value, filter)
    }

    pub fn get_config_comment(&mut self, name: &str, value: &str) -> Result<bool> {
        self.raise_to_locked()?;
        self.config().get_comment(name, value)
    }

    pub fn set_config_comment(&mut self, name: &str, value: &str) -> Result<()> {
        accessor::check_comment(name, value)?;
        self.raise_to_writable()?;
        self.config().set_comment(name, value)
    }

    pub fn has_config_comment(&mut self, name: &str) -> Result<bool> {
        self.raise_to_locked()?;
        self.config().has_comment(name)
    }

    /// Strip NOOBS auto-generated settings
    ///
    /// Only stages when the sentinel is present. Returns true when something
    /// was removed, which also means a reboot is needed after commit.
    pub fn remove_noobs_defaults(&mut self) -> Result<bool> {
        self.raise_to_locked()?;
        let sentinel = self.noobs_sentinel.clone();
        if !self.config().noobs_defaults_present(&sentinel)? {
            return Ok(false);
        }

        self.raise_to_writable()?;
        self.config().remove_noobs_defaults(&sentinel)
    }

    /// Copy the in-flight content (staged if any) to `dest`
    pub fn copy_to(&mut self, dest: &Path) -> Result<()> {
        self.raise_to_locked()?;
        self.config().copy_to(dest)
    }

    /// Replace the in-flight content with `src`
    pub fn copy_from(&mut self, src: &Path) -> Result<()> {
        self.raise_to_writable()?;
        self.config().copy_from(src)
    }

    /// Returns true if the config looked corrupt and the default was staged
    ///
    /// The caller still has to commit or abort.
    pub fn check_corrupt_config(&mut self) -> Result<bool> {
        self.raise_to_locked()?;
        if !self.config().check_corrupt(&self.required_markers) {
            return Ok(false);
        }

        self.raise_to_writable()?;
        let staged = self.config();
        self.install_default(staged.path())?;
        Ok(true)
    }

    /// End the transaction, publishing staged edits
    ///
    /// Always returns to idle, releasing the lock.
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        match mem::take(&mut self.state) {
            TxState::Writable { lock, staged } => {
                if self.dry_run {
                    tracing::info!(staged = %staged.display(), "dry run config transaction kept");
                    drop(lock);
                    return Ok(CommitOutcome::DryRun(staged));
                }

                tracing::info!(path = %self.path.display(), "closing config transaction");
                let published = self.publish(&staged);
                drop(lock);
                if let Err(err) = &published {
                    tracing::error!(
                        staged = %staged.display(),
                        error = %err,
                        "failed to publish staged config"
                    );
                }
                published.map(|()| CommitOutcome::Committed)
            }
            TxState::Locked { .. } | TxState::Idle => {
                tracing::warn!(path = %self.path.display(), "closing config transaction with no edits");
                Ok(CommitOutcome::NoChanges)
            }
        }
    }

    fn publish(&self, staged: &Path) -> Result<()> {
        fs::rename(staged, &self.path)?;
        sync_dir(&self.dir)?;
        sync_filesystems();
        Ok(())
    }

    /// End the transaction, discarding staged edits
    ///
    /// Fails with [`Error::NothingStaged`] when no write ever happened; the
    /// lock is released either way.
    pub fn abort(&mut self) -> Result<()> {
        match mem::take(&mut self.state) {
            TxState::Writable { lock, staged } => {
                tracing::info!(path = %self.path.display(), "aborting config transaction");
                let removed = fs::remove_file(&staged);
                drop(lock);
                removed?;
                Ok(())
            }
            TxState::Locked { .. } | TxState::Idle => Err(Error::NothingStaged(self.path.clone())),
        }
    }

    /// Exit-time check: commit a transaction left writable and report it
    ///
    /// A transaction holding only a read lock is released quietly.
    pub fn close_left_open(&mut self) -> Result<()> {
        match self.state {
            TxState::Idle => Ok(()),
            TxState::Locked { .. } => {
                self.state = TxState::Idle;
                Ok(())
            }
            TxState::Writable { .. } => {
                self.commit()?;
                Err(Error::OpenTransaction(vec![self.path.clone()]))
            }
        }
    }
}

impl Drop for ConfigTransaction {
    fn drop(&mut self) {
        if !self.is_writable() {
            return;
        }

        tracing::error!(path = %self.path.display(), "config transaction left open, committing");
        if let Err(err) = self.commit() {
            tracing::error!(path = %self.path.display(), error = %err, "failed to commit left-open transaction");
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn sync_filesystems() {
    // SAFETY: sync(2) takes no arguments and cannot fail.
    unsafe { libc::sync() }
}

#[cfg(not(unix))]
fn sync_filesystems() {}
