use crate::video::transcode::TranscodeError;
use std::path::PathBuf;

/// Fatal failure categories of one analysis run. Carried inside
/// `anyhow::Error`; callers that need to classify use `downcast_ref`.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("input error: {0}")]
    Input(String),

    #[error("failed to write intermediate video {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    /// The intermediate file is kept on disk for inspection.
    #[error("transcode failed, intermediate kept at {raw_path}: {source}")]
    Transcode {
        raw_path: PathBuf,
        #[source]
        source: TranscodeError,
    },

    #[error("failed to write artifact {path}: {reason}")]
    Artifact { path: PathBuf, reason: String },
}

impl AnalysisError {
    pub fn input(reason: impl Into<String>) -> Self {
        AnalysisError::Input(reason.into())
    }
}
