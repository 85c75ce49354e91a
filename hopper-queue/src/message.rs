//! The on-disk message record.
//!
//! A message's identity is its current file path; everything else the queue
//! needs to know about it is encoded in the filename:
//!
//! ```text
//! <timestamp_ms>[.<flag>]*
//! ```
//!
//! The leading component is the push time in milliseconds since the Unix
//! epoch, and each `.<flag>` suffix records one prior failed attempt, oldest
//! first. A freshly pushed message has no suffixes at all.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crate::error::{QueueError, Result};

/// Reason a processing attempt failed, recorded in the filename suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// The handler exceeded its wall-clock budget and was killed.
    Timeout,
    /// The handler returned an error or panicked.
    Error,
    /// The message was expired, exhausted, or otherwise terminally routed.
    Dead,
    /// Caller-supplied failure reason.
    Custom(String),
}

impl Flag {
    /// The filename token for this flag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::Dead => "dead",
            Self::Custom(token) => token,
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flag {
    type Err = QueueError;

    fn from_str(token: &str) -> Result<Self> {
        match token {
            "timeout" => Ok(Self::Timeout),
            "error" => Ok(Self::Error),
            "dead" => Ok(Self::Dead),
            _ => {
                if token.is_empty()
                    || token
                        .chars()
                        .any(|c| c == '.' || c == '/' || c == '\\' || c.is_whitespace())
                {
                    return Err(QueueError::BadName(token.to_string()));
                }
                Ok(Self::Custom(token.to_string()))
            }
        }
    }
}

/// A single unit of work, identified by the file that currently holds it.
///
/// Moving the file between `queued/`, `pulled/`, and a dead-letter queue is
/// what moves the message between states; this struct is a parsed view of
/// one such file.
#[derive(Debug, Clone)]
pub struct Message {
    path: PathBuf,
    payload: Arc<[u8]>,
    timestamp_ms: u64,
    attempts: Vec<Flag>,
}

impl Message {
    /// Reconstruct a message from the file at `path` and its payload bytes.
    ///
    /// # Errors
    /// Fails if the filename does not follow the message grammar.
    pub(crate) fn from_path(path: PathBuf, payload: Arc<[u8]>) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(std::ffi::OsStr::to_str)
            .ok_or_else(|| QueueError::BadName(path.display().to_string()))?;
        let (timestamp_ms, attempts) = parse_filename(name)?;

        Ok(Self {
            path,
            payload,
            timestamp_ms,
            attempts,
        })
    }

    /// The file currently holding this message.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The opaque payload supplied at push.
    pub fn payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.payload)
    }

    /// Push time in milliseconds since the Unix epoch.
    pub const fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Prior failed attempts, oldest first. Empty for a fresh message.
    pub fn attempts(&self) -> &[Flag] {
        &self.attempts
    }

    /// The filename this message carries today.
    pub fn filename(&self) -> String {
        let mut name = self.timestamp_ms.to_string();
        for flag in &self.attempts {
            name.push('.');
            name.push_str(flag.as_str());
        }
        name
    }

    /// The filename this message would carry after one more failed attempt.
    pub fn filename_with(&self, flag: &Flag) -> String {
        let mut name = self.filename();
        name.push('.');
        name.push_str(flag.as_str());
        name
    }
}

/// Parse a message filename into its timestamp and attempt history.
///
/// Filenames with path separators or traversal patterns are rejected
/// outright so a hostile name can never escape the queue directory.
///
/// # Errors
/// Fails if the name is not `<decimal timestamp>[.<flag>]*`.
pub fn parse_filename(name: &str) -> Result<(u64, Vec<Flag>)> {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(QueueError::BadName(name.to_string()));
    }

    let mut tokens = name.split('.');
    let timestamp_ms = tokens
        .next()
        .filter(|stamp| !stamp.is_empty() && stamp.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|stamp| stamp.parse().ok())
        .ok_or_else(|| QueueError::BadName(name.to_string()))?;
    let attempts = tokens.map(Flag::from_str).collect::<Result<Vec<_>>>()?;

    Ok((timestamp_ms, attempts))
}
