//! Error types for bootcfg
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, invalid settings)
//! - 3: Blocked (lock held elsewhere, transaction left open)
//! - 4: Operation failed (I/O, serialization)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the bootcfg CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for bootcfg operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Nothing staged to discard for {0}")]
    NothingStaged(PathBuf),

    // Blocked (exit code 3)
    #[error("Timed out waiting for config lock {0}")]
    LockTimeout(PathBuf),

    #[error("Config transaction left open: {}", display_paths(.0))]
    OpenTransaction(Vec<PathBuf>),

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidSettings(_) | Error::InvalidArgument(_) | Error::NothingStaged(_) => {
                exit_codes::USER_ERROR
            }

            Error::LockTimeout(_) | Error::OpenTransaction(_) => exit_codes::BLOCKED,

            Error::Io(_) | Error::Json(_) | Error::TomlParse(_) | Error::TomlSerialize(_) => {
                exit_codes::OPERATION_FAILED
            }
        }
    }

    /// Short machine-readable name for the error variant
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidSettings(_) => "invalid_settings",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::NothingStaged(_) => "nothing_staged",
            Error::LockTimeout(_) => "lock_timeout",
            Error::OpenTransaction(_) => "open_transaction",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::TomlParse(_) => "toml_parse",
            Error::TomlSerialize(_) => "toml_serialize",
        }
    }
}

/// Result type alias for bootcfg operations
pub type Result<T> = std::result::Result<T, Error>;
