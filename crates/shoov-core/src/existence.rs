//! Remote dedup gate: is this fingerprint already recorded on the build?

use std::sync::Arc;

use shoov_api::{BuildId, ShoovApi};
use tracing::debug;

use crate::error::Result;
use crate::fingerprint::Fingerprint;

/// Asks the backend whether a regression is already recorded.
///
/// The answer is authoritative: a `true` here always suppresses the upload,
/// whatever the session's local state says.
#[derive(Clone)]
pub struct ExistenceCheck {
    api: Arc<dyn ShoovApi>,
}

impl ExistenceCheck {
    pub fn new(api: Arc<dyn ShoovApi>) -> Self {
        Self { api }
    }

    pub async fn exists(&self, build: &BuildId, fingerprint: &Fingerprint) -> Result<bool> {
        let count = self
            .api
            .count_screenshots(build, fingerprint.as_str())
            .await?;
        debug!(build = %build, fingerprint = %fingerprint.short(), count, "Existence checked");
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_files;
    use shoov_api::fakes::MemoryShoovApi;

    async fn sample_fingerprint(scope: &str) -> Fingerprint {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"pixels").unwrap();
        fingerprint_files(&[path.as_path()], scope).await.unwrap()
    }

    #[tokio::test]
    async fn test_exists_true_only_for_recorded_build() {
        let api = Arc::new(MemoryShoovApi::new());
        let (_, build) = api.seed_repository("owner/site");
        let fp = sample_fingerprint(&build.0).await;
        api.seed_screenshot(&build, fp.as_str());

        let check = ExistenceCheck::new(api.clone());
        assert!(check.exists(&build, &fp).await.unwrap());
        assert!(!check
            .exists(&BuildId("elsewhere".to_string()), &fp)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_exists_false_for_unknown_fingerprint() {
        let api = Arc::new(MemoryShoovApi::new());
        let (_, build) = api.seed_repository("owner/site");
        let fp = sample_fingerprint("x").await;

        let check = ExistenceCheck::new(api.clone());
        assert!(!check.exists(&build, &fp).await.unwrap());
        assert_eq!(api.calls().screenshots, 1);
    }
}
