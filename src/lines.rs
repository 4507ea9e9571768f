//! Raw line storage
//!
//! Reads a file as an ordered list of lines and rewrites whole files with
//! write, flush, fsync discipline. No parsing happens here.
//!
//! Lines keep the bytes and line ending they were read with, so a line nobody edits
//! is written back exactly as it was read, even when it is not valid UTF-8.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// Terminator of a single line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
    /// Last line of a file without a trailing newline
    Missing,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
            LineEnding::Missing => b"",
        }
    }
}

/// One line of a file: its content bytes plus how it was terminated
///
/// Equality against `str` compares content only, ignoring the ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    body: Vec<u8>,
    ending: LineEnding,
}

impl RawLine {
    pub fn new(text: impl Into<String>, ending: LineEnding) -> Self {
        Self {
            body: text.into().into_bytes(),
            ending,
        }
    }

    pub fn from_bytes(body: Vec<u8>, ending: LineEnding) -> Self {
        Self { body, ending }
    }

    /// Content as text, `None` when the line is not valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn ending(&self) -> LineEnding {
        self.ending
    }

    pub fn set_ending(&mut self, ending: LineEnding) {
        self.ending = ending;
    }

    /// Same ending, new content
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self::new(text, self.ending)
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.body.starts_with(prefix.as_bytes())
    }

    pub fn contains(&self, needle: &str) -> bool {
        let needle = needle.as_bytes();
        needle.is_empty() || self.body.windows(needle.len()).any(|w| w == needle)
    }
}

impl From<&str> for RawLine {
    fn from(text: &str) -> Self {
        Self::new(text, LineEnding::Lf)
    }
}

impl From<String> for RawLine {
    fn from(text: String) -> Self {
        Self::new(text, LineEnding::Lf)
    }
}

impl PartialEq<str> for RawLine {
    fn eq(&self, other: &str) -> bool {
        self.body == other.as_bytes()
    }
}

impl PartialEq<&str> for RawLine {
    fn eq(&self, other: &&str) -> bool {
        self.body == other.as_bytes()
    }
}

impl fmt::Display for RawLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.body))
    }
}

/// Ending to use for new lines: that of the first terminated line, else LF
pub fn newline_of(lines: &[RawLine]) -> LineEnding {
    lines
        .iter()
        .map(RawLine::ending)
        .find(|ending| *ending != LineEnding::Missing)
        .unwrap_or_default()
}

fn split_lines(content: &[u8]) -> Vec<RawLine> {
    let mut lines = Vec::new();
    let mut rest = content;
    while !rest.is_empty() {
        let line = match rest.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let (body, ending) = match rest[..pos].strip_suffix(b"\r") {
                    Some(body) => (body, LineEnding::CrLf),
                    None => (&rest[..pos], LineEnding::Lf),
                };
                rest = &rest[pos + 1..];
                RawLine::from_bytes(body.to_vec(), ending)
            }
            None => {
                let line = RawLine::from_bytes(rest.to_vec(), LineEnding::Missing);
                rest = &[];
                line
            }
        };
        lines.push(line);
    }
    lines
}

/// Read a file into lines
///
/// A missing file reads as empty. Callers treat empty as "nothing to do".
pub fn read_lines(path: &Path) -> Result<Vec<RawLine>> {
    match fs::read(path) {
        Ok(bytes) => Ok(split_lines(&bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

/// Truncate and rewrite `path` with `lines`, then fsync before closing
///
/// An unterminated line that is not last gets a `\n` so lines never merge.
pub fn write_lines(path: &Path, lines: &[RawLine]) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    let mut writer = BufWriter::new(file);
    let last = lines.len().saturating_sub(1);
    for (idx, line) in lines.iter().enumerate() {
        writer.write_all(&line.body)?;
        match line.ending {
            LineEnding::Missing if idx != last => writer.write_all(b"\n")?,
            ending => writer.write_all(ending.as_bytes())?,
        }
    }
    writer.flush()?;

    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Create `path` holding a single `#` line if it does not exist
///
/// A freshly created file must not read as empty, otherwise later writes
/// would treat it as "nothing to do".
pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    let mut file = File::create(path)?;
    file.write_all(b"#\n")?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}
