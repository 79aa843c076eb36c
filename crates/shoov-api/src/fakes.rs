//! In-memory fake of the Shoov backend (testing only)
//!
//! `MemoryShoovApi` mimics the backend's bookkeeping: an upload for an
//! unknown repository creates the repository, its build and the screenshot
//! together, and the returned build id is what later lookups see.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::ShoovApi;
use crate::error::ApiError;
use crate::types::{BuildId, RepositoryId, UploadForm, UploadReceipt};
use crate::Result;

/// Number of calls received per endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub repositories: usize,
    pub builds: usize,
    pub screenshots: usize,
    pub uploads: usize,
}

impl CallCounts {
    /// Total number of backend calls
    pub fn total(&self) -> usize {
        self.repositories + self.builds + self.screenshots + self.uploads
    }
}

#[derive(Debug, Default)]
struct FakeState {
    repositories: HashMap<String, RepositoryId>,
    builds: HashMap<RepositoryId, Vec<BuildId>>,
    screenshots: Vec<(BuildId, String)>,
    uploaded: Vec<UploadForm>,
    next_id: u64,
    calls: CallCounts,
    lookup_failure: Option<u16>,
    upload_failure: Option<u16>,
}

impl FakeState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

/// In-memory backend satisfying the [`ShoovApi`] contract.
#[derive(Debug, Default)]
pub struct MemoryShoovApi {
    state: Mutex<FakeState>,
    upload_delay: Option<Duration>,
}

impl MemoryShoovApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every upload, to keep several uploads in flight at once.
    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    /// Register a repository with one build; returns both ids.
    pub fn seed_repository(&self, label: &str) -> (RepositoryId, BuildId) {
        let mut state = self.state.lock().unwrap();
        let repository = RepositoryId(state.next_id());
        let build = BuildId(state.next_id());
        state
            .repositories
            .insert(label.to_string(), repository.clone());
        state
            .builds
            .entry(repository.clone())
            .or_default()
            .push(build.clone());
        (repository, build)
    }

    /// Record a screenshot hash on a build, as a previous session would have.
    pub fn seed_screenshot(&self, build: &BuildId, screenshot_hash: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .screenshots
            .push((build.clone(), screenshot_hash.to_string()));
    }

    /// Answer every lookup with the given HTTP status.
    pub fn fail_lookups_with(&self, status: u16) {
        self.state.lock().unwrap().lookup_failure = Some(status);
    }

    /// Answer every upload with the given HTTP status.
    pub fn fail_uploads_with(&self, status: u16) {
        self.state.lock().unwrap().upload_failure = Some(status);
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    /// Forms accepted so far, in completion order.
    pub fn uploaded(&self) -> Vec<UploadForm> {
        self.state.lock().unwrap().uploaded.clone()
    }

    fn lookup_guard(&self, endpoint: &str) -> Result<()> {
        match self.state.lock().unwrap().lookup_failure {
            Some(status) => Err(ApiError::from_status(endpoint, status)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ShoovApi for MemoryShoovApi {
    async fn find_repository(&self, label: &str) -> Result<Option<RepositoryId>> {
        self.state.lock().unwrap().calls.repositories += 1;
        self.lookup_guard("/api/repositories")?;
        Ok(self.state.lock().unwrap().repositories.get(label).cloned())
    }

    async fn latest_build(&self, repository: &RepositoryId) -> Result<Option<BuildId>> {
        self.state.lock().unwrap().calls.builds += 1;
        self.lookup_guard("/api/builds")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .builds
            .get(repository)
            .and_then(|builds| builds.last().cloned()))
    }

    async fn count_screenshots(&self, build: &BuildId, screenshot_hash: &str) -> Result<u64> {
        self.state.lock().unwrap().calls.screenshots += 1;
        self.lookup_guard("/api/screenshots")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .screenshots
            .iter()
            .filter(|(b, h)| b == build && h == screenshot_hash)
            .count() as u64)
    }

    async fn upload_screenshot(&self, form: &UploadForm) -> Result<UploadReceipt> {
        self.state.lock().unwrap().calls.uploads += 1;

        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }

        for (_, path) in form.file_fields() {
            if let Err(source) = tokio::fs::metadata(path).await {
                return Err(ApiError::Artifact {
                    path: path.clone(),
                    source,
                });
            }
        }

        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.upload_failure {
            return Err(ApiError::from_status("/api/screenshots-upload", status));
        }

        let repository = match state.repositories.get(&form.repository).cloned() {
            Some(id) => id,
            None => {
                let id = RepositoryId(state.next_id());
                state.repositories.insert(form.repository.clone(), id.clone());
                id
            }
        };

        let existing = state
            .builds
            .get(&repository)
            .and_then(|builds| builds.last().cloned());
        let build = match existing {
            Some(build) => build,
            None => {
                let build = BuildId(state.next_id());
                state.builds.entry(repository).or_default().push(build.clone());
                build
            }
        };

        let screenshot_id = state.next_id();
        state
            .screenshots
            .push((build.clone(), form.screenshot_hash.clone()));
        state.uploaded.push(form.clone());

        Ok(UploadReceipt {
            build,
            record: serde_json::json!({ "id": screenshot_id, "label": form.label }),
        })
    }
}
