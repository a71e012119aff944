//! Error types for mboxsite.
//!
//! Two families live here. [`ArchiveError`] covers the few conditions that
//! stop a run outright (the input cannot be read, or holds no records).
//! [`Degradation`] covers everything that can go wrong with a single message;
//! those never abort the run and are handed back to the caller as
//! [`Warning`]s alongside the corpus.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Fatal errors: no meaningful corpus can be produced.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O error with the associated path (`<stream>` for plain readers).
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("MBOX file not found: {0}")]
    FileNotFound(PathBuf),

    /// The input was readable but contained no records at all.
    #[error("Input contains no mail records")]
    EmptyArchive,

    /// A configuration file was found but could not be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, ArchiveError>`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal problem with one record. The record is always kept.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum Degradation {
    /// The record could not be fully parsed and is kept as a placeholder.
    #[error("record kept as placeholder: {0}")]
    ParseDegraded(String),

    /// No usable date; the message carries the unknown-date sentinel.
    #[error("date unresolved: {0}")]
    DateUnresolved(String),

    /// Some text was decoded with replacement characters.
    #[error("encoding unresolved: {0}")]
    EncodingUnresolved(String),

    /// A reply cycle was found and this message was made a thread root.
    #[error("reply cycle of {cycle_len} message(s) broken at record {orphaned}")]
    ThreadCycleBroken { orphaned: u64, cycle_len: usize },

    /// The HTML body lost all of its text when sanitized; plain text was used.
    #[error("body fell back to plain text: {0}")]
    BodyUnsanitizable(String),
}

impl Degradation {
    /// Short, stable name of the degradation kind (for summaries).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParseDegraded(_) => "ParseDegraded",
            Self::DateUnresolved(_) => "DateUnresolved",
            Self::EncodingUnresolved(_) => "EncodingUnresolved",
            Self::ThreadCycleBroken { .. } => "ThreadCycleBroken",
            Self::BodyUnsanitizable(_) => "BodyUnsanitizable",
        }
    }
}

/// A degradation tagged with the record it happened to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// Zero-based index of the record in the input.
    pub record: u64,
    #[serde(flatten)]
    pub degradation: Degradation,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "record {}: {}", self.record, self.degradation)
    }
}

/// A value produced by a lenient step, plus whatever went wrong on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Degraded<T> {
    pub value: T,
    pub degradations: Vec<Degradation>,
}

impl<T> Degraded<T> {
    /// A value produced without any degradation.
    pub fn clean(value: T) -> Self {
        Self {
            value,
            degradations: Vec::new(),
        }
    }

    /// A value produced with a single degradation.
    pub fn with(value: T, degradation: Degradation) -> Self {
        Self {
            value,
            degradations: vec![degradation],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.degradations.is_empty()
    }

    /// Take the value, moving its degradations into `sink`.
    pub fn unwrap_into(self, sink: &mut Vec<Degradation>) -> T {
        sink.extend(self.degradations);
        self.value
    }

    /// Tag every degradation with a record index.
    pub fn warnings(&self, record: u64) -> Vec<Warning> {
        self.degradations
            .iter()
            .cloned()
            .map(|degradation| Warning {
                record,
                degradation,
            })
            .collect()
    }
}
