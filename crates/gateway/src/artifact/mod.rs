//! The single versioned artifact: upload with rolling backups, and serving.

mod handlers;
pub mod store;

use axum::http::StatusCode;
use thiserror::Error;

pub use handlers::{serve_artifact, upload_artifact};
pub use store::{ArtifactStore, UploadOutcome};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no current artifact")]
    NotFound,

    #[error("could not find a free backup name for {stamp}")]
    ConcurrentUploadConflict { stamp: String },

    /// The final rename failed and the current artifact is gone. The previous
    /// version survives as `backup`.
    #[error("upload left no current artifact (previous version at {backup:?}): {source}")]
    PartialUploadFailure {
        backup: Option<String>,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ArtifactError {
    pub fn status(&self) -> StatusCode {
        match self {
            ArtifactError::NotFound => StatusCode::NOT_FOUND,
            ArtifactError::ConcurrentUploadConflict { .. } => StatusCode::CONFLICT,
            ArtifactError::PartialUploadFailure { .. } | ArtifactError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            ArtifactError::NotFound => "Artifact not found".to_string(),
            ArtifactError::ConcurrentUploadConflict { .. } => {
                "Another upload is in progress, retry shortly".to_string()
            }
            ArtifactError::PartialUploadFailure { .. } | ArtifactError::Storage(_) => {
                "Failed to store artifact".to_string()
            }
        }
    }
}
