/// Error types for preview generation
///
/// Job-level setup errors propagate to whoever called `start()`.
/// Per-file errors are rendered into the job log and never leave a worker.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = PreviewError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to create output directory {}: {source}", path.display())]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("job has already been started")]
    AlreadyStarted,

    #[error("failed to decode RAW file {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    #[error("failed to encode preview {}: {message}", path.display())]
    Encode { path: PathBuf, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn job monitor: {0}")]
    Spawn(#[source] io::Error),

    #[error("catalog query failed: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("invalid allow-list {}: {message}", path.display())]
    AllowList { path: PathBuf, message: String },

    #[error("settings serialization failed: {0}")]
    Settings(#[from] serde_json::Error),
}

impl PreviewError {
    pub(crate) fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn encode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Encode {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
