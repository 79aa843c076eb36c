//! Structured lifecycle events of a reporting session.
//!
//! - `session_span` tagging everything with the session id
//! - `emit_*` functions for regression, upload and report events
//!
//! Events are `info!` except failures, which are `warn!`.

use tracing::{info, warn};

/// Session-scoped span; every event of the session runs inside it.
///
/// ```ignore
/// let span = session_span("6f1c...");
/// reporter_work().instrument(span).await;
/// ```
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("shoov.session", session_id = %session_id)
}

/// Emit event: a new comparison failed its tolerance.
pub fn emit_regression_detected(key: &str, label: &str, mismatch: Option<f64>) {
    info!(
        event = "regression.detected",
        key = %key,
        label = %label,
        mismatch_percentage = mismatch,
    );
}

/// Emit event: upload skipped because the regression is already known.
pub fn emit_regression_skipped(key: &str, fingerprint: &str, reason: &str) {
    info!(
        event = "regression.skipped",
        key = %key,
        fingerprint = %fingerprint,
        reason = %reason,
    );
}

/// Emit event: upload task handed to the queue.
pub fn emit_upload_enqueued(label: &str, fingerprint: &str, seq: usize) {
    info!(event = "upload.enqueued", label = %label, fingerprint = %fingerprint, seq = seq);
}

/// Emit event: upload accepted by the backend.
pub fn emit_upload_finished(label: &str, build: &str, duration_ms: u64) {
    info!(
        event = "upload.finished",
        label = %label,
        build = %build,
        duration_ms = duration_ms,
    );
}

/// Emit event: upload or per-regression pipeline failure (warning level).
pub fn emit_upload_failed(label: &str, artifacts: &str, error: &dyn std::fmt::Display) {
    warn!(event = "upload.failed", label = %label, artifacts = %artifacts, error = %error);
}

/// Emit event: aggregated report ready.
pub fn emit_report_ready(build: Option<&str>, regressions: usize, uploaded: usize, failed: usize) {
    info!(
        event = "report.ready",
        build = build.unwrap_or("unknown"),
        regressions = regressions,
        uploaded = uploaded,
        failed = failed,
    );
}
