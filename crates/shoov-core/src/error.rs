//! Error taxonomy for the reporting pipeline.

use std::path::PathBuf;

use shoov_api::ApiError;

/// Shoov core errors.
#[derive(Debug, thiserror::Error)]
pub enum ShoovError {
    #[error("cannot read artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("the Shoov access token is not defined, visit your account page")]
    MissingCredential,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ShoovError {
    /// Session-fatal errors unwind the whole reporting path; everything
    /// else is isolated to a single regression.
    pub fn is_session_fatal(&self) -> bool {
        match self {
            ShoovError::MissingCredential => true,
            ShoovError::Api(api) => api.is_credential_failure(),
            _ => false,
        }
    }
}

/// Result type for Shoov core operations.
pub type Result<T> = std::result::Result<T, ShoovError>;
