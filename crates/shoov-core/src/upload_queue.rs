//! Upload queue: concurrent uploads with aggregated completion.
//!
//! Every enqueued task runs on its own tokio task and ends in exactly one
//! terminal state. A failed upload never cancels its siblings. `join`
//! waits for everything enqueued so far and may be called again later.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use shoov_api::{ApiError, BuildId, ShoovApi, UploadForm};
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use crate::comparison::ArtifactSet;
use crate::directory::RepositoryIdentity;
use crate::fingerprint::Fingerprint;
use crate::git::GitMetadata;
use crate::obs::{emit_upload_enqueued, emit_upload_failed, emit_upload_finished};
use crate::session::BuildContext;

/// A regression confirmed absent remotely, ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub fingerprint: Fingerprint,
    pub artifacts: ArtifactSet,
    pub label: String,
    pub repository: RepositoryIdentity,
    pub git: Arc<GitMetadata>,
    pub tags: Vec<String>,
}

impl UploadTask {
    /// Multipart form for the upload endpoint.
    pub fn to_form(&self) -> UploadForm {
        UploadForm {
            label: self.label.clone(),
            baseline: self.artifacts.baseline.clone(),
            regression: self.artifacts.regression.clone(),
            diff: self.artifacts.diff.clone(),
            baseline_name: self.artifacts.baseline.to_string_lossy().into_owned(),
            git_commit: self.git.commit.clone(),
            git_branch: self.git.branch.clone(),
            git_subject: self.git.subject.clone(),
            directory_prefix: self.git.path_prefix.clone(),
            repository: self.repository.as_str().to_string(),
            tags: self.tags.clone(),
            screenshot_hash: self.fingerprint.as_str().to_string(),
        }
    }
}

/// Why an upload failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    BackendUnavailable,
    InvalidCredential,
    Transport,
    Decode,
    Artifact,
    /// The task ended without producing a result (panicked or cancelled)
    Aborted,
}

impl From<&ApiError> for FailureKind {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::BackendUnavailable { .. } => FailureKind::BackendUnavailable,
            ApiError::InvalidCredential { .. } => FailureKind::InvalidCredential,
            ApiError::Transport(_) => FailureKind::Transport,
            ApiError::Decode { .. } => FailureKind::Decode,
            ApiError::Artifact { .. } => FailureKind::Artifact,
        }
    }
}

/// Terminal state of one upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Uploaded { build: BuildId },
    Failed { kind: FailureKind, detail: String },
}

/// Identifies an enqueued upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadHandle {
    seq: usize,
}

impl UploadHandle {
    pub fn seq(&self) -> usize {
        self.seq
    }
}

/// Outcome of one task, as collected by `join`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub handle: UploadHandle,
    pub label: String,
    pub fingerprint: Fingerprint,
    pub artifacts: ArtifactSet,
    pub outcome: UploadOutcome,
    pub duration_ms: u64,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, UploadOutcome::Uploaded { .. })
    }
}

/// Aggregate state of the queue after a `join`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSummary {
    pub enqueued: usize,
    pub uploaded: usize,
    pub failed: usize,
    /// Reports ordered by enqueue sequence
    pub reports: Vec<TaskReport>,
}

/// First credential rejection seen by any upload of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFailure {
    pub endpoint: String,
    pub status: u16,
}

impl CredentialFailure {
    pub fn to_error(&self) -> ApiError {
        ApiError::InvalidCredential {
            endpoint: self.endpoint.clone(),
            status: self.status,
        }
    }
}

/// Tracks in-flight uploads of one session.
pub struct UploadQueue {
    api: Arc<dyn ShoovApi>,
    build: Arc<BuildContext>,
    credential_failure: Arc<OnceLock<CredentialFailure>>,
    tasks: JoinSet<TaskReport>,
    pending: BTreeMap<UploadHandle, UploadTask>,
    fingerprints: HashSet<Fingerprint>,
    finished: BTreeMap<UploadHandle, TaskReport>,
    enqueued: usize,
}

impl UploadQueue {
    pub fn new(api: Arc<dyn ShoovApi>, build: Arc<BuildContext>) -> Self {
        Self {
            api,
            build,
            credential_failure: Arc::new(OnceLock::new()),
            tasks: JoinSet::new(),
            pending: BTreeMap::new(),
            fingerprints: HashSet::new(),
            finished: BTreeMap::new(),
            enqueued: 0,
        }
    }

    /// Register `task` and start uploading it. Does not wait.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&mut self, task: UploadTask) -> UploadHandle {
        let handle = UploadHandle { seq: self.enqueued };
        self.enqueued += 1;
        self.fingerprints.insert(task.fingerprint.clone());
        self.pending.insert(handle, task.clone());

        emit_upload_enqueued(&task.label, task.fingerprint.short(), handle.seq);

        let api = Arc::clone(&self.api);
        let build = Arc::clone(&self.build);
        let credential_failure = Arc::clone(&self.credential_failure);
        self.tasks.spawn(
            run_upload(api, build, credential_failure, handle, task)
                .instrument(tracing::Span::current()),
        );

        handle
    }

    /// Wait until every task enqueued so far is terminal.
    pub async fn join(&mut self) -> QueueSummary {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => {
                    self.pending.remove(&report.handle);
                    self.finished.insert(report.handle, report);
                }
                Err(e) => warn!(error = %e, "Upload task ended abnormally"),
            }
        }

        // Tasks that ended without a report are counted as failed.
        for (handle, task) in std::mem::take(&mut self.pending) {
            self.finished.insert(
                handle,
                TaskReport {
                    handle,
                    label: task.label,
                    fingerprint: task.fingerprint,
                    artifacts: task.artifacts,
                    outcome: UploadOutcome::Failed {
                        kind: FailureKind::Aborted,
                        detail: "upload task aborted".to_string(),
                    },
                    duration_ms: 0,
                },
            );
        }

        let reports: Vec<TaskReport> = self.finished.values().cloned().collect();
        let uploaded = reports.iter().filter(|r| r.succeeded()).count();
        QueueSummary {
            enqueued: self.enqueued,
            uploaded,
            failed: reports.len() - uploaded,
            reports,
        }
    }

    /// Number of tasks ever enqueued.
    pub fn count(&self) -> usize {
        self.enqueued
    }

    /// Tasks not yet collected by `join`.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Whether a task with this fingerprint was already enqueued.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    /// Set once any upload was rejected for its credential.
    pub fn credential_failure(&self) -> Option<&CredentialFailure> {
        self.credential_failure.get()
    }
}

async fn run_upload(
    api: Arc<dyn ShoovApi>,
    build: Arc<BuildContext>,
    credential_failure: Arc<OnceLock<CredentialFailure>>,
    handle: UploadHandle,
    task: UploadTask,
) -> TaskReport {
    let started = Instant::now();
    let form = task.to_form();

    let outcome = match api.upload_screenshot(&form).await {
        Ok(receipt) => {
            if build.adopt_build(receipt.build.clone()) {
                info!(build = %receipt.build, "Adopted build id from upload response");
            }
            debug!(label = %task.label, response = %receipt.record, "Upload response");
            emit_upload_finished(
                &task.label,
                &receipt.build.0,
                started.elapsed().as_millis() as u64,
            );
            UploadOutcome::Uploaded {
                build: receipt.build,
            }
        }
        Err(err) => {
            if let ApiError::InvalidCredential { endpoint, status } = &err {
                let _ = credential_failure.set(CredentialFailure {
                    endpoint: endpoint.clone(),
                    status: *status,
                });
            }
            emit_upload_failed(&task.label, &describe_artifacts(&task.artifacts), &err);
            UploadOutcome::Failed {
                kind: FailureKind::from(&err),
                detail: err.to_string(),
            }
        }
    };

    TaskReport {
        handle,
        label: task.label,
        fingerprint: task.fingerprint,
        artifacts: task.artifacts,
        outcome,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// `baseline, regression, diff` paths for log lines.
pub(crate) fn describe_artifacts(artifacts: &ArtifactSet) -> String {
    artifacts
        .paths()
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
