//! Per-file config access
//!
//! [`BootConfig`] knows how to make individual modifications to one config
//! file. It does no locking of its own: it is driven by a
//! [`ConfigTransaction`](crate::transaction::ConfigTransaction), which points
//! it at either the live file or a staged copy.
//!
//! Every mutation rewrites the whole file and fsyncs it before returning.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::document::{Document, Filter};
use crate::error::{Error, Result};
use crate::lines::{self, RawLine};

/// Outcome of a value lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Lookup {
    /// The key (or its engine default) has this value
    Found(String),
    /// The file has content but the key is not set and has no default
    Missing,
    /// The file is empty or absent, there was nothing to look in
    NoContent,
}

impl Lookup {
    pub fn value(&self) -> Option<&str> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Missing | Lookup::NoContent => None,
        }
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Missing | Lookup::NoContent => None,
        }
    }
}

fn comment_line(name: &str, value: &str) -> String {
    format!("### {name}: {value}")
}

fn comment_prefix(name: &str) -> String {
    format!("### {name}:")
}

fn is_line_break(c: char) -> bool {
    c == '\n' || c == '\r'
}

/// Reject a key name or value that could not be written as one entry line
pub fn check_entry(name: &str, value: Option<&str>) -> Result<()> {
    if name.is_empty() || name.contains(|c: char| c == '=' || c.is_whitespace()) {
        return Err(Error::InvalidArgument(format!("invalid key name {name:?}")));
    }
    if let Some(value) = value.filter(|v| v.contains(is_line_break)) {
        return Err(Error::InvalidArgument(format!(
            "value for {name} spans several lines: {value:?}"
        )));
    }
    Ok(())
}

/// Reject an annotation that could not be written as one `### name: value` line
pub fn check_comment(name: &str, value: &str) -> Result<()> {
    if name.is_empty() || name.contains(|c: char| c == ':' || c.is_whitespace()) {
        return Err(Error::InvalidArgument(format!("invalid comment name {name:?}")));
    }
    if value.contains(is_line_break) {
        return Err(Error::InvalidArgument(format!(
            "comment {name} spans several lines: {value:?}"
        )));
    }
    Ok(())
}

/// Open `path` and flush its data to disk
fn sync_file(path: &Path) -> Result<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

/// Accessor for a single config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    path: PathBuf,
}

impl BootConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn ensure_exists(&self) -> Result<()> {
        lines::ensure_exists(&self.path)
    }

    pub fn get_value(
        &self,
        name: &str,
        filter: &Filter,
        fallback: bool,
        ignore_comments: bool,
    ) -> Result<Lookup> {
        let lines = lines::read_lines(&self.path)?;
        if lines.is_empty() {
            return Ok(Lookup::NoContent);
        }

        let doc = Document::parse(lines);
        Ok(match doc.get(name, filter, fallback, ignore_comments) {
            Some(value) => Lookup::Found(value),
            None => Lookup::Missing,
        })
    }

    /// Set `name`, or comment it out when `value` is `None`
    pub fn set_value(&self, name: &str, value: Option<&str>, filter: &Filter) -> Result<()> {
        check_entry(name, value)?;
        let lines = lines::read_lines(&self.path)?;
        if lines.is_empty() {
            tracing::debug!(path = %self.path.display(), name, "no content, skipping write");
            return Ok(());
        }

        tracing::info!(
            path = %self.path.display(),
            name,
            value = value.unwrap_or("<disabled>"),
            %filter,
            "writing config value"
        );

        let mut doc = Document::parse(lines);
        doc.set(name, value, filter);
        lines::write_lines(&self.path, &doc.dump())
    }

    /// Write `### name: value` as the first line, dropping older annotations for `name`
    pub fn set_comment(&self, name: &str, value: &str) -> Result<()> {
        check_comment(name, value)?;
        let lines = lines::read_lines(&self.path)?;
        if lines.is_empty() {
            return Ok(());
        }

        tracing::info!(path = %self.path.display(), name, value, "writing config comment");

        let prefix = comment_prefix(name);
        let mut out = Vec::with_capacity(lines.len() + 1);
        out.push(RawLine::new(comment_line(name, value), lines::newline_of(&lines)));
        out.extend(lines.into_iter().filter(|line| !line.starts_with(&prefix)));
        lines::write_lines(&self.path, &out)
    }

    /// Whether the exact annotation `### name: value` is present
    pub fn get_comment(&self, name: &str, value: &str) -> Result<bool> {
        let expected = comment_line(name, value);
        Ok(lines::read_lines(&self.path)?
            .iter()
            .any(|line| line.as_bytes() == expected.as_bytes()))
    }

    pub fn has_comment(&self, name: &str) -> Result<bool> {
        let prefix = comment_prefix(name);
        Ok(lines::read_lines(&self.path)?
            .iter()
            .any(|line| line.starts_with(&prefix)))
    }

    /// Heuristic integrity check
    ///
    /// A missing or unreadable file is corrupt, as is one where any of
    /// `required_markers` appears on no line.
    pub fn check_corrupt(&self, required_markers: &[String]) -> bool {
        if !self.exists() {
            tracing::warn!(path = %self.path.display(), "config missing, assuming corrupt");
            return true;
        }

        let lines = match lines::read_lines(&self.path) {
            Ok(lines) => lines,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "config unreadable, assuming corrupt");
                return true;
            }
        };

        let missing: Vec<&str> = required_markers
            .iter()
            .filter(|marker| !lines.iter().any(|line| line.contains(marker)))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            return false;
        }

        tracing::warn!(
            path = %self.path.display(),
            missing = ?missing,
            "required parameters not found, assuming corrupt"
        );
        true
    }

    pub fn noobs_defaults_present(&self, sentinel: &str) -> Result<bool> {
        Ok(lines::read_lines(&self.path)?
            .iter()
            .any(|line| line == sentinel))
    }

    /// Drop the sentinel line and everything after it
    ///
    /// Returns whether the sentinel was found. The file is only rewritten
    /// when it was.
    pub fn remove_noobs_defaults(&self, sentinel: &str) -> Result<bool> {
        let mut lines = lines::read_lines(&self.path)?;
        let Some(pos) = lines.iter().position(|line| line == sentinel) else {
            return Ok(false);
        };

        tracing::info!(path = %self.path.display(), removed = lines.len() - pos, "removing NOOBS defaults");
        lines.truncate(pos);
        lines::write_lines(&self.path, &lines)?;
        Ok(true)
    }

    pub fn copy_to(&self, dest: &Path) -> Result<()> {
        fs::copy(&self.path, dest)?;
        sync_file(dest)
    }

    pub fn copy_from(&self, src: &Path) -> Result<()> {
        fs::copy(src, &self.path)?;
        sync_file(&self.path)
    }
}
