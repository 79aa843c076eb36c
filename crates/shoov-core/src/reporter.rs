//! Regression reporter: the per-session orchestrator.
//!
//! Phases: `Idle → Evaluating → AwaitingQueue → Reported`. Each batch is
//! filtered against the session's seen set and the tolerance flag; every
//! new failure is fingerprinted, checked against the backend and, when
//! absent, handed to the upload queue. `finish` waits for the queue and
//! produces the aggregated report.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use shoov_api::{ApiConfig, BuildId, HttpShoovApi, ShoovApi};
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::comparison::{ComparisonResult, ResultBatch};
use crate::config::ShoovConfig;
use crate::directory::{RemoteDirectory, RepositoryIdentity};
use crate::error::{Result, ShoovError};
use crate::existence::ExistenceCheck;
use crate::fingerprint::{fingerprint_artifacts, Fingerprint};
use crate::git::GitMetadata;
use crate::obs::{
    emit_regression_detected, emit_regression_skipped, emit_report_ready, emit_upload_failed,
    session_span,
};
use crate::session::SessionContext;
use crate::upload_queue::{describe_artifacts, QueueSummary, UploadHandle, UploadQueue, UploadTask};

/// Lifecycle phase of a reporting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Evaluating,
    AwaitingQueue,
    Reported,
}

/// What happened to one failing comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum RegressionStatus {
    /// Upload handed to the queue
    Queued(UploadHandle),
    /// Backend already holds this fingerprint for the build
    AlreadyReported,
    /// Another failure of this session has byte-identical artifacts
    DuplicateInSession,
    /// Fingerprinting or the existence check failed
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionOutcome {
    pub key: String,
    pub label: String,
    pub fingerprint: Option<Fingerprint>,
    pub status: RegressionStatus,
}

/// Result of evaluating one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub new_keys: usize,
    pub already_seen: usize,
    pub within_tolerance: usize,
    pub regressions: Vec<RegressionOutcome>,
}

/// Final report of a session, computed once after the queue drained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedReport {
    pub session_id: Uuid,
    pub build_id: Option<BuildId>,
    /// Failing comparisons seen this session, uploaded or not
    pub regressions_found: usize,
    /// Uploads accepted by the backend
    pub upload_count: usize,
    pub enqueued: usize,
    pub failed_uploads: usize,
    /// Regressions whose fingerprint or existence check failed
    pub failed_checks: usize,
    /// `<client>/#/screenshots/<build>`, present iff regressions were found
    /// and the build is known
    pub link: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AggregatedReport {
    /// Regressions always fail the run, whatever happened to the uploads.
    pub fn has_regressions(&self) -> bool {
        self.regressions_found > 0
    }
}

struct Precheck {
    fingerprint: Fingerprint,
    exists: bool,
}

/// Orchestrates one reporting session.
pub struct RegressionReporter {
    config: ShoovConfig,
    session: SessionContext,
    span: tracing::Span,
    git: Arc<GitMetadata>,
    repository: RepositoryIdentity,
    directory: RemoteDirectory,
    existence: ExistenceCheck,
    queue: UploadQueue,
    phase: SessionPhase,
    regressions_found: usize,
    failed_checks: usize,
}

impl RegressionReporter {
    /// Build a reporter over `api`.
    ///
    /// Fails with [`ShoovError::MissingCredential`] before anything else
    /// when no access token is configured.
    pub fn new(config: ShoovConfig, api: Arc<dyn ShoovApi>, git: GitMetadata) -> Result<Self> {
        config.require_token()?;

        let session = SessionContext::new();
        let span = session_span(&session.id.to_string());
        let repository = git.repository();
        let queue = UploadQueue::new(Arc::clone(&api), Arc::clone(&session.build));

        debug!(parent: &span, repository = %repository, "Session created");
        Ok(Self {
            config,
            session,
            span,
            git: Arc::new(git),
            repository,
            directory: RemoteDirectory::new(Arc::clone(&api)),
            existence: ExistenceCheck::new(api),
            queue,
            phase: SessionPhase::Idle,
            regressions_found: 0,
            failed_checks: 0,
        })
    }

    /// Build a reporter talking to the configured HTTP backend.
    pub fn connect(config: ShoovConfig, git: GitMetadata) -> Result<Self> {
        let token = config.require_token()?;
        let api = HttpShoovApi::new(ApiConfig::new(&config.backend_url, token))?;
        Self::new(config, Arc::new(api), git)
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn config(&self) -> &ShoovConfig {
        &self.config
    }

    pub fn uploads_enqueued(&self) -> usize {
        self.queue.count()
    }

    /// Evaluate one batch of comparison results.
    ///
    /// Keys already seen this session are discarded without any remote
    /// call. Per-regression failures are reported in the returned outcomes;
    /// session-fatal failures (rejected credential) are returned as errors
    /// and stop any further upload.
    pub async fn process_results(&mut self, batch: &ResultBatch) -> Result<BatchReport> {
        let span = self.span.clone();
        self.process_results_inner(batch).instrument(span).await
    }

    async fn process_results_inner(&mut self, batch: &ResultBatch) -> Result<BatchReport> {
        self.ensure_credential_accepted()?;
        self.phase = SessionPhase::Evaluating;

        let mut report = BatchReport::default();
        let mut failing: Vec<&ComparisonResult> = Vec::new();
        for (key, results) in batch.entries() {
            if !self.session.seen.insert(key) {
                report.already_seen += 1;
                continue;
            }
            report.new_keys += 1;
            for result in results {
                if result.within_tolerance {
                    report.within_tolerance += 1;
                } else {
                    failing.push(result);
                }
            }
        }

        if failing.is_empty() {
            return Ok(report);
        }

        for result in &failing {
            emit_regression_detected(&result.key, &result.label(), result.mismatch_percentage);
        }
        self.regressions_found += failing.len();

        self.ensure_build_context().await?;

        // Independent failures are checked concurrently.
        let prechecks = join_all(failing.iter().map(|result| self.precheck(result))).await;

        for (result, precheck) in failing.into_iter().zip(prechecks) {
            let outcome = self.decide(result, precheck)?;
            report.regressions.push(outcome);
        }

        Ok(report)
    }

    /// Resolve repository → build once per session.
    ///
    /// Not-found is a normal outcome: the first upload will register the
    /// repository and its build, and the queue adopts the returned build id.
    /// A backend outage is not retried: the session continues unscoped until
    /// an upload reports the build.
    async fn ensure_build_context(&self) -> Result<()> {
        let build = &self.session.build;
        if build.resolution_attempted() || build.build_id().is_some() {
            return Ok(());
        }

        let resolved = async {
            let Some(repository) = self.directory.resolve_repository(&self.repository).await?
            else {
                return Ok(None);
            };
            build.set_repository(repository.clone());
            self.directory.resolve_build(&repository).await
        }
        .await;

        match resolved {
            Ok(found) => {
                build.mark_resolution_attempted();
                if let Some(id) = found {
                    build.adopt_build(id);
                }
                Ok(())
            }
            Err(e) if e.is_session_fatal() => Err(e),
            Err(e) => {
                build.mark_resolution_attempted();
                warn!(
                    error = %e,
                    repository = %self.repository,
                    "Build resolution failed, continuing unscoped"
                );
                Ok(())
            }
        }
    }

    /// Fingerprint, then ask the backend. Existence can only be checked
    /// once a build id is known; before that every failure is new.
    async fn precheck(&self, result: &ComparisonResult) -> Result<Precheck> {
        let build = self.session.build.build_id().cloned();
        let scope = self.session.build.scope().to_string();

        let fingerprint = fingerprint_artifacts(&result.artifacts, &scope).await?;
        let exists = match &build {
            Some(build) => self.existence.exists(build, &fingerprint).await?,
            None => false,
        };
        Ok(Precheck {
            fingerprint,
            exists,
        })
    }

    fn decide(
        &mut self,
        result: &ComparisonResult,
        precheck: Result<Precheck>,
    ) -> Result<RegressionOutcome> {
        let label = result.label();

        let precheck = match precheck {
            Ok(precheck) => precheck,
            Err(e) if e.is_session_fatal() => return Err(e),
            Err(e) => {
                self.failed_checks += 1;
                let build = self.session.build.scope().to_string();
                emit_upload_failed(
                    &label,
                    &format!("{} (build {build})", describe_artifacts(&result.artifacts)),
                    &e,
                );
                return Ok(RegressionOutcome {
                    key: result.key.clone(),
                    label,
                    fingerprint: None,
                    status: RegressionStatus::Failed(e.to_string()),
                });
            }
        };

        let fingerprint = precheck.fingerprint;
        let status = if precheck.exists {
            emit_regression_skipped(&result.key, fingerprint.short(), "already reported");
            RegressionStatus::AlreadyReported
        } else if self.queue.contains(&fingerprint) {
            emit_regression_skipped(&result.key, fingerprint.short(), "duplicate in session");
            RegressionStatus::DuplicateInSession
        } else {
            self.ensure_credential_accepted()?;
            let handle = self.queue.enqueue(UploadTask {
                fingerprint: fingerprint.clone(),
                artifacts: result.artifacts.clone(),
                label: label.clone(),
                repository: self.repository.clone(),
                git: Arc::clone(&self.git),
                tags: result.tags.clone(),
            });
            RegressionStatus::Queued(handle)
        };

        Ok(RegressionOutcome {
            key: result.key.clone(),
            label,
            fingerprint: Some(fingerprint),
            status,
        })
    }

    /// A rejected token fails every later call identically: stop early.
    fn ensure_credential_accepted(&self) -> Result<()> {
        match self.queue.credential_failure() {
            Some(failure) => Err(ShoovError::Api(failure.to_error())),
            None => Ok(()),
        }
    }

    /// Wait for the uploads enqueued so far without ending the session.
    pub async fn flush_uploads(&mut self) -> QueueSummary {
        let span = self.span.clone();
        self.queue.join().instrument(span).await
    }

    /// Session teardown: wait for every upload, then build the report.
    ///
    /// Fails with `Api(InvalidCredential)` when any upload of the session
    /// had its access token rejected, even after the last batch.
    pub async fn finish(mut self) -> Result<AggregatedReport> {
        self.phase = SessionPhase::AwaitingQueue;
        let span = self.span.clone();
        let summary = self.queue.join().instrument(span.clone()).await;
        self.phase = SessionPhase::Reported;

        let _entered = span.enter();
        let build_id = self.session.build.build_id().cloned();
        let link = match (&build_id, self.regressions_found > 0) {
            (Some(build), true) => Some(self.config.regression_url(&build.0)),
            (None, true) => {
                warn!(
                    regressions = self.regressions_found,
                    "Regressions found but no build id is known, cannot link them"
                );
                None
            }
            (_, false) => None,
        };

        emit_report_ready(
            build_id.as_ref().map(|b| b.0.as_str()),
            self.regressions_found,
            summary.uploaded,
            summary.failed,
        );

        if let Some(failure) = self.queue.credential_failure() {
            return Err(ShoovError::Api(failure.to_error()));
        }

        Ok(AggregatedReport {
            session_id: self.session.id,
            build_id,
            regressions_found: self.regressions_found,
            upload_count: summary.uploaded,
            enqueued: summary.enqueued,
            failed_uploads: summary.failed,
            failed_checks: self.failed_checks,
            link,
            started_at: self.session.started_at,
            finished_at: Utc::now(),
        })
    }
}
