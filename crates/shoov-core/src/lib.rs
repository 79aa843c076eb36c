//! Shoov Core Library
//!
//! Turns batches of screenshot comparison results into deduplicated
//! regression uploads and a link to review them.
//!
//! ## Pipeline
//!
//! 1. `comparison`: parse diff-engine output into a [`ResultBatch`]
//! 2. `reporter`: filter by seen keys and tolerance
//! 3. `directory`: resolve the repository and its latest build once per session
//! 4. `fingerprint` + `existence`: skip regressions the backend already has
//! 5. `upload_queue`: upload the rest concurrently, adopt the returned build id

pub mod comparison;
pub mod config;
pub mod directory;
pub mod error;
pub mod existence;
pub mod fingerprint;
pub mod git;
pub mod obs;
pub mod reporter;
pub mod session;
pub mod telemetry;
pub mod upload_queue;

pub use comparison::{ArtifactSet, ComparisonResult, ResultBatch};
pub use config::{ConfigLayer, ShoovConfig, DEFAULT_BACKEND_URL, DEFAULT_CLIENT_URL};
pub use directory::{RemoteDirectory, RepositoryIdentity};
pub use error::{Result, ShoovError};
pub use existence::ExistenceCheck;
pub use fingerprint::{fingerprint_artifacts, fingerprint_files, Fingerprint, UNSCOPED};
pub use git::GitMetadata;
pub use obs::{
    emit_regression_detected, emit_regression_skipped, emit_report_ready, emit_upload_enqueued,
    emit_upload_failed, emit_upload_finished, session_span,
};
pub use reporter::{
    AggregatedReport, BatchReport, RegressionOutcome, RegressionReporter, RegressionStatus,
    SessionPhase,
};
pub use session::{BuildContext, SeenResultSet, SessionContext};
pub use upload_queue::{
    FailureKind, QueueSummary, TaskReport, UploadHandle, UploadOutcome, UploadQueue, UploadTask,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
