//! Command-line interface for bootcfg
//!
//! This module defines the CLI structure using clap derive macros.
//! Every invocation runs as a single config transaction: the command reads
//! or stages its edits, then the transaction is committed before exit.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::document::Filter;
use crate::error::Result;
use crate::output::OutputOptions;
use crate::registry::Registry;
use crate::settings::{Settings, DEFAULT_SETTINGS_PATH};
use crate::transaction::ConfigTransaction;

mod comment;
mod maintain;
mod value;

/// bootcfg - transactional boot config editing
///
/// Reads and edits the shared boot configuration file under an exclusive
/// lock, publishing changes with an atomic rename.
#[derive(Parser, Debug)]
#[command(name = "bootcfg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file (defaults to /etc/bootcfg.toml)
    #[arg(long, global = true, env = "BOOTCFG_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Operate on this config file instead of the configured target
    #[arg(long, global = true, env = "BOOTCFG_TARGET")]
    pub target: Option<PathBuf>,

    /// Operate on the backup config of this hardware model
    #[arg(long, global = true, conflicts_with = "target")]
    pub model: Option<String>,

    /// Stage edits but never overwrite the target
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a config value
    Get {
        /// Key name (use dtparam:<param> for dtparam entries)
        name: String,

        /// Only consider entries in this [section]
        #[arg(long)]
        section: Option<String>,

        /// Report unset keys as missing instead of their default
        #[arg(long)]
        no_fallback: bool,

        /// Read values from commented-out entries when no active one exists
        #[arg(long)]
        ignore_comments: bool,
    },

    /// Set a config value
    Set {
        /// Key name (use dtparam:<param> for dtparam entries)
        name: String,

        /// New value
        value: String,

        /// Only touch entries in this [section]
        #[arg(long)]
        section: Option<String>,
    },

    /// Comment out a config value, keeping its line
    Unset {
        /// Key name
        name: String,

        /// Only touch entries in this [section]
        #[arg(long)]
        section: Option<String>,
    },

    /// Metadata annotations (`### name: value` lines)
    #[command(subcommand)]
    Comment(CommentCommands),

    /// Check the config for corruption, restoring the default if needed
    Check,

    /// Remove settings auto-generated by NOOBS
    Noobs,

    /// Copy the config to another file
    CopyTo {
        /// Destination file
        dest: PathBuf,
    },

    /// Replace the config with another file's content
    CopyFrom {
        /// Source file
        src: PathBuf,
    },
}

/// Comment subcommands
#[derive(Subcommand, Debug)]
pub enum CommentCommands {
    /// Check whether `### name: value` is present
    Get { name: String, value: String },

    /// Write `### name: value` as the first line
    Set { name: String, value: String },

    /// Check whether any `### name:` annotation is present
    Has { name: String },
}

fn filter_for(section: Option<String>) -> Filter {
    section.map(Filter::section).unwrap_or_default()
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let settings = match &self.settings {
            Some(path) => Settings::load(path)?,
            None => Settings::load_or_default(&PathBuf::from(DEFAULT_SETTINGS_PATH)),
        };

        let mut registry = Registry::new(settings);
        if self.dry_run {
            registry.set_dry_run();
        }

        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };

        let tx = match (&self.target, &self.model) {
            (Some(target), _) => registry.transaction(target),
            (None, Some(model)) => registry.for_model(model),
            (None, None) => registry.live(),
        };

        let result = dispatch(self.command, tx, output);
        if result.is_err() && tx.is_writable() {
            // Staged content may be half-written; never publish it.
            let _ = tx.abort();
        }

        let finished = registry.finish();
        result?;
        finished
    }
}

fn dispatch(command: Commands, tx: &mut ConfigTransaction, output: OutputOptions) -> Result<()> {
    match command {
        Commands::Get {
            name,
            section,
            no_fallback,
            ignore_comments,
        } => value::run_get(
            tx,
            value::GetOptions {
                name,
                filter: filter_for(section),
                fallback: !no_fallback,
                ignore_comments,
            },
            output,
        ),
        Commands::Set {
            name,
            value,
            section,
        } => value::run_set(tx, &name, Some(&value), &filter_for(section), output),
        Commands::Unset { name, section } => {
            value::run_set(tx, &name, None, &filter_for(section), output)
        }
        Commands::Comment(CommentCommands::Get { name, value }) => {
            comment::run_get(tx, &name, &value, output)
        }
        Commands::Comment(CommentCommands::Set { name, value }) => {
            comment::run_set(tx, &name, &value, output)
        }
        Commands::Comment(CommentCommands::Has { name }) => comment::run_has(tx, &name, output),
        Commands::Check => maintain::run_check(tx, output),
        Commands::Noobs => maintain::run_noobs(tx, output),
        Commands::CopyTo { dest } => maintain::run_copy_to(tx, &dest, output),
        Commands::CopyFrom { src } => maintain::run_copy_from(tx, &src, output),
    }
}
