//! Backend trait consumed by the reporting pipeline.
//!
//! `HttpShoovApi` talks to the real REST surface; `fakes::MemoryShoovApi`
//! satisfies the same contract in memory for tests.

use async_trait::async_trait;

use crate::types::{BuildId, RepositoryId, UploadForm, UploadReceipt};
use crate::Result;

/// Shoov backend operations.
///
/// Lookups return `Ok(None)` (or a zero count) for a business "not found";
/// only transport and status failures are errors.
#[async_trait]
pub trait ShoovApi: Send + Sync {
    /// `GET /api/repositories?filter[label]=<label>`
    async fn find_repository(&self, label: &str) -> Result<Option<RepositoryId>>;

    /// `GET /api/builds?filter[repository]=<id>`, most recent build.
    async fn latest_build(&self, repository: &RepositoryId) -> Result<Option<BuildId>>;

    /// `GET /api/screenshots?filter[build]=..&filter[screenshot_hash]=..`, match count.
    async fn count_screenshots(&self, build: &BuildId, screenshot_hash: &str) -> Result<u64>;

    /// `POST /api/screenshots-upload`
    async fn upload_screenshot(&self, form: &UploadForm) -> Result<UploadReceipt>;
}
