//! bootcfg - transactional boot config library
//!
//! Safe, crash-resilient read/write access to a line-oriented boot
//! configuration file (`/boot/config.txt`) shared by uncoordinated
//! processes on one machine.
//!
//! # Core Concepts
//!
//! - **Transactions**: all access goes through a [`ConfigTransaction`] that
//!   serializes processes with an advisory lock and stages edits on a
//!   private copy
//! - **Atomic publish**: commit renames the staged copy over the target,
//!   then fsyncs the directory
//! - **Recovery**: missing or corrupt configs are replaced by a packaged
//!   default document
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `settings`: Settings loading from `bootcfg.toml`
//! - `error`: Error types and result aliases
//! - `lines`: Raw line reads and durable rewrites
//! - `document`: Key/value document model of the config grammar
//! - `accessor`: Get/set/comment operations on one file
//! - `lock`: Advisory file locking with timeout
//! - `transaction`: The idle/locked/writable state machine
//! - `registry`: One transaction per target path for the application
//! - `output`: JSON and human output for the CLI

pub mod accessor;
pub mod cli;
pub mod document;
pub mod error;
pub mod lines;
pub mod lock;
pub mod output;
pub mod registry;
pub mod settings;
pub mod transaction;

pub use error::{Error, Result};
pub use transaction::ConfigTransaction;
