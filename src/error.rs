//! Error types shared across the crate.
//!
//! - `LoadError` - a story cannot be turned into a trial (fatal for that story)
//! - `ConfigError` - the configuration file is unreadable or out of range
//! - `TrialError` - a host action arrived in a state that does not allow it
//! - `AppError` - top-level failure returned to the entry point
//!
//! Audio failures live in [`crate::audio::AudioError`]; they never abort a
//! trial and are reported as diagnostics instead.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cannot read story file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid story file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Story '{story}' has no sentences")]
    EmptyText { story: String },

    /// The offset between the two ID spaces cannot be derived.
    #[error("Story '{story}' has no alignment clusters")]
    EmptyMapping { story: String },

    #[error("Story '{story}': partition {partition} of cluster '{cluster}' has no sentence IDs")]
    EmptyPartition {
        story: String,
        cluster: String,
        partition: usize,
    },

    #[error("Story '{story}': cluster '{cluster}' has an unparsable sentence ID '{raw}'")]
    InvalidSentenceId {
        story: String,
        cluster: String,
        raw: String,
    },

    #[error("Story '{story}': mapped sentence {sentence_id} (cluster '{cluster}') is not in the text after offset {offset}")]
    SentenceOutOfRange {
        story: String,
        cluster: String,
        sentence_id: i64,
        offset: i64,
    },

    #[error("Story '{story}' declares {count} alignment clusters, at most {max} are supported")]
    TooManyClusters {
        story: String,
        count: usize,
        max: usize,
    },

    #[error("Story '{story}' is not configured")]
    UnknownStory { story: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrialError {
    #[error("The story has not been read to the end yet")]
    NotComplete,
}

/// Anything that ends the program with a non-zero exit code.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot serialize trial records: {0}")]
    Records(#[from] serde_json::Error),
}
