// Error types for the chorale pipeline.
//
// `SyncError` and `MalformedToken` are the two failures the core algorithm
// can raise; they get their own types so the training and generation loops
// can match on them and apply their recovery policy (skip a piece, truncate
// a walk). Everything else funnels into the crate-wide `Error`.

use crate::event::Beats;
use crate::voice::VoiceId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A piece whose voices do not add up to the same total duration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("{voice} ran out of events at beat {elapsed} while other voices reached {furthest}")]
    Exhausted {
        voice: VoiceId,
        elapsed: Beats,
        furthest: Beats,
    },
}

/// A joint-state token that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed token at byte {offset}: {message}")]
pub struct MalformedToken {
    pub offset: usize,
    pub message: String,
}

impl MalformedToken {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        MalformedToken {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    MalformedToken(#[from] MalformedToken),

    #[error("no pieces in {corpus} satisfy the filter ({filter})")]
    CorpusFilterEmpty { corpus: PathBuf, filter: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid pitch {0:?}")]
    InvalidPitch(String),

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: {message}")]
    Corpus { path: PathBuf, message: String },

    #[error("model: {0}")]
    Model(String),

    #[error("viewer {command:?} failed: {message}")]
    Viewer { command: String, message: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}
