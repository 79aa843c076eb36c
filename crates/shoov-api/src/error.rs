//! Error types for shoov-api

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while talking to the Shoov backend
#[derive(Error, Debug)]
pub enum ApiError {
    /// Backend answered with a 5xx status
    #[error("Backend unavailable: {endpoint} returned {status}")]
    BackendUnavailable { endpoint: String, status: u16 },

    /// Backend rejected the request with a non-200, non-5xx status.
    ///
    /// The backend only does this for an invalid or expired access token.
    #[error(
        "Access token is incorrect or no longer valid ({endpoint} returned {status}), visit your account page"
    )]
    InvalidCredential { endpoint: String, status: u16 },

    /// Connection, TLS or timeout failure before a status was received
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("Unexpected response from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },

    /// An artifact to upload could not be opened
    #[error("Cannot read artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// Map a non-success HTTP status onto the error taxonomy.
    pub fn from_status(endpoint: &str, status: u16) -> Self {
        if status >= 500 {
            ApiError::BackendUnavailable {
                endpoint: endpoint.to_string(),
                status,
            }
        } else {
            ApiError::InvalidCredential {
                endpoint: endpoint.to_string(),
                status,
            }
        }
    }

    /// Whether every later request with the same token will fail identically.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, ApiError::InvalidCredential { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}
