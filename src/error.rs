//! Error types for the configuration model.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A config fragment that cannot be turned into a host block.
///
/// `line` is 1-based within the text or fragment that was parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ParseError {
    pub line: Option<usize>,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            line: None,
            message: message.into(),
        }
    }

    pub(crate) fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Bytes were written but the file on disk does not match what was
    /// serialized, so the save must be treated as failed.
    #[error("Verification failed for {}: {reason}", .path.display())]
    Verification { path: PathBuf, reason: String },

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    /// An external program (ssh, ssh-keygen) could not do its job.
    #[error("{program}: {message}")]
    External { program: String, message: String },
}

impl ConfigError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
