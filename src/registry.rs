//! Transaction registry
//!
//! Holds one [`ConfigTransaction`] per target path for the lifetime of the
//! application. Construct it once at startup, pass it to callers, and call
//! [`Registry::finish`] at the application boundary so a transaction left
//! writable is committed and reported instead of silently dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::accessor::Lookup;
use crate::document::Filter;
use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::transaction::{CommitOutcome, ConfigTransaction};

/// Registry of config transactions, keyed by target path
#[derive(Debug)]
pub struct Registry {
    settings: Settings,
    dry_run: bool,
    transactions: BTreeMap<PathBuf, ConfigTransaction>,
}

impl Registry {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            dry_run: false,
            transactions: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Make every commit from now on stage-only
    ///
    /// There is no way back: once set, no target is overwritten for the rest
    /// of the registry's life.
    pub fn set_dry_run(&mut self) {
        self.dry_run = true;
        for tx in self.transactions.values_mut() {
            tx.set_dry_run(true);
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Transaction for `path`, created on first use
    pub fn transaction(&mut self, path: impl AsRef<Path>) -> &mut ConfigTransaction {
        let settings = &self.settings;
        let dry_run = self.dry_run;
        self.transactions
            .entry(path.as_ref().to_path_buf())
            .or_insert_with_key(|path| {
                tracing::debug!(path = %path.display(), "opening config transaction");
                let mut tx = ConfigTransaction::new(path.clone(), settings);
                tx.set_dry_run(dry_run);
                tx
            })
    }

    /// Transaction for the live boot config
    pub fn live(&mut self) -> &mut ConfigTransaction {
        let path = self.settings.target_path.clone();
        self.transaction(path)
    }

    /// Transaction for the backup config of a hardware model
    pub fn for_model(&mut self, model: &str) -> &mut ConfigTransaction {
        let path = self.settings.backup_path_for_model(model);
        self.transaction(path)
    }

    pub fn get_config_value(
        &mut self,
        name: &str,
        filter: &Filter,
        fallback: bool,
        ignore_comments: bool,
    ) -> Result<Lookup> {
        self.live()
            .get_config_value(name, filter, fallback, ignore_comments)
    }

    pub fn set_config_value(&mut self, name: &str, value: Option<&str>, filter: &Filter) -> Result<()> {
        self.live().set_config_value(name, value, filter)
    }

    pub fn get_config_comment(&mut self, name: &str, value: &str) -> Result<bool> {
        self.live().get_config_comment(name, value)
    }

    pub fn set_config_comment(&mut self, name: &str, value: &str) -> Result<()> {
        self.live().set_config_comment(name, value)
    }

    pub fn has_config_comment(&mut self, name: &str) -> Result<bool> {
        self.live().has_config_comment(name)
    }

    pub fn remove_noobs_defaults(&mut self) -> Result<bool> {
        self.live().remove_noobs_defaults()
    }

    pub fn config_copy_to(&mut self, dest: &Path) -> Result<()> {
        self.live().copy_to(dest)
    }

    pub fn config_copy_from(&mut self, src: &Path) -> Result<()> {
        self.live().copy_from(src)
    }

    pub fn check_corrupt_config(&mut self) -> Result<bool> {
        self.live().check_corrupt_config()
    }

    pub fn end_config_transaction(&mut self) -> Result<CommitOutcome> {
        self.live().commit()
    }

    pub fn end_config_transaction_no_writeback(&mut self) -> Result<()> {
        self.live().abort()
    }

    /// Close every transaction
    ///
    /// Writable transactions are committed first, then reported together as
    /// [`Error::OpenTransaction`]. Other failures take precedence.
    pub fn finish(mut self) -> Result<()> {
        let mut left_open = Vec::new();
        let mut failure = None;

        for tx in self.transactions.values_mut() {
            match tx.close_left_open() {
                Ok(()) => {}
                Err(Error::OpenTransaction(paths)) => left_open.extend(paths),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if !left_open.is_empty() {
            return Err(Error::OpenTransaction(left_open));
        }
        Ok(())
    }
}
