//! Shoov-API: backend client for the Shoov visual regression service
//!
//! This crate owns all I/O with the Shoov REST backend: repository and
//! build lookups, screenshot existence queries and multipart uploads.
//!
//! ## Key Components
//!
//! - `ShoovApi`: async trait the reporting pipeline depends on
//! - `HttpShoovApi`: reqwest implementation (`access-token` header auth)
//! - `fakes::MemoryShoovApi`: in-memory backend for tests
//!
//! Status mapping: 5xx is `BackendUnavailable`, any other non-success
//! status is `InvalidCredential`. A zero-count listing is not an error.

mod api;
mod client;
mod error;
pub mod fakes;
pub mod types;

pub use api::ShoovApi;
pub use client::{ApiConfig, HttpShoovApi};
pub use error::ApiError;
pub use types::{BuildId, RepositoryId, UploadForm, UploadReceipt};

/// Result type for shoov-api operations
pub type Result<T> = std::result::Result<T, ApiError>;
