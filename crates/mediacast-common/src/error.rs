//! Unified error type for mediacast.
//!
//! Configuration problems ([`Error::ConfigIo`], [`Error::Parse`]) and bad rule
//! patterns ([`Error::PatternCompile`]) are recoverable: callers log them and
//! fall back to defaults. [`Error::ReadOnlyTarget`] and [`Error::EmptyCascade`]
//! indicate an improperly constructed cascade and are propagated.

use std::fmt;
use std::path::{Path, PathBuf};

/// Unified error type covering all failure modes in mediacast.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A settings file could not be read or written.
    #[error("Config IO error [{}]: {message}", path.display())]
    ConfigIo {
        /// The file that failed.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// A settings file was readable but malformed.
    #[error("Parse error [{}:{line}]: {message}", path.display())]
    Parse {
        /// The file that failed to parse.
        path: PathBuf,
        /// 1-based line number of the offending line.
        line: usize,
        /// Human-readable error description.
        message: String,
    },

    /// A rule's regular expression failed to compile.
    #[error("Pattern compile error [{pattern}]: {message}")]
    PatternCompile {
        /// The offending pattern.
        pattern: String,
        /// The regex engine's description of the failure.
        message: String,
    },

    /// A write was attempted against a cascade whose innermost layer is not writable.
    #[error("Cascade has no writable layer")]
    ReadOnlyTarget,

    /// A cascade was constructed without any layers.
    #[error("Cascade requires at least one layer")]
    EmptyCascade,

    /// Input data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Convenience constructor for [`Error::ConfigIo`].
    pub fn config_io(path: impl AsRef<Path>, message: impl fmt::Display) -> Self {
        Error::ConfigIo {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Parse`].
    pub fn parse(path: impl AsRef<Path>, line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.as_ref().to_path_buf(),
            line,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::PatternCompile`].
    pub fn pattern(pattern: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::PatternCompile {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Whether callers should log and degrade to defaults rather than fail.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::ConfigIo { .. }
            | Error::Parse { .. }
            | Error::PatternCompile { .. }
            | Error::Validation(_)
            | Error::Io { .. } => true,
            Error::ReadOnlyTarget | Error::EmptyCascade => false,
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
