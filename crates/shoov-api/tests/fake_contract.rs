//! Contract tests for the in-memory backend.
//!
//! The reporting pipeline relies on these behaviours of the real backend;
//! the fake has to reproduce them for the core tests to mean anything.

use shoov_api::fakes::MemoryShoovApi;
use shoov_api::{ApiError, BuildId, RepositoryId, ShoovApi, UploadForm};

fn write_artifacts(dir: &std::path::Path, name: &str) -> UploadForm {
    let baseline = dir.join(format!("{name}.baseline.png"));
    let regression = dir.join(format!("{name}.regression.png"));
    let diff = dir.join(format!("{name}.diff.png"));
    std::fs::write(&baseline, b"baseline").unwrap();
    std::fs::write(&regression, b"regression").unwrap();
    std::fs::write(&diff, b"diff").unwrap();

    UploadForm {
        label: name.to_string(),
        baseline_name: baseline.to_string_lossy().into_owned(),
        baseline,
        regression,
        diff,
        git_commit: "abc123".to_string(),
        git_branch: "main".to_string(),
        git_subject: "Initial".to_string(),
        directory_prefix: String::new(),
        repository: "owner/site".to_string(),
        tags: vec![],
        screenshot_hash: format!("hash-{name}"),
    }
}

#[tokio::test]
async fn unknown_repository_is_none_not_error() {
    let api = MemoryShoovApi::new();
    let found = api.find_repository("owner/unknown").await.unwrap();
    assert_eq!(found, None);
}

#[tokio::test]
async fn seeded_repository_resolves_to_latest_build() {
    let api = MemoryShoovApi::new();
    let (repo, build) = api.seed_repository("owner/site");

    assert_eq!(api.find_repository("owner/site").await.unwrap(), Some(repo.clone()));
    assert_eq!(api.latest_build(&repo).await.unwrap(), Some(build));
}

#[tokio::test]
async fn repository_without_build_has_no_latest_build() {
    let api = MemoryShoovApi::new();
    let missing = RepositoryId("999".to_string());
    assert_eq!(api.latest_build(&missing).await.unwrap(), None);
}

#[tokio::test]
async fn upload_bootstraps_repository_and_build() {
    let dir = tempfile::tempdir().unwrap();
    let api = MemoryShoovApi::new();
    let form = write_artifacts(dir.path(), "home");

    let receipt = api.upload_screenshot(&form).await.unwrap();

    let repo = api.find_repository("owner/site").await.unwrap().unwrap();
    assert_eq!(api.latest_build(&repo).await.unwrap(), Some(receipt.build.clone()));
    assert_eq!(
        api.count_screenshots(&receipt.build, "hash-home").await.unwrap(),
        1
    );
}

#[tokio::test]
async fn screenshot_count_is_scoped_by_build() {
    let api = MemoryShoovApi::new();
    let (_, build) = api.seed_repository("owner/site");
    api.seed_screenshot(&build, "abc");

    assert_eq!(api.count_screenshots(&build, "abc").await.unwrap(), 1);
    assert_eq!(
        api.count_screenshots(&BuildId("other".to_string()), "abc")
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn scripted_statuses_follow_error_taxonomy() {
    let dir = tempfile::tempdir().unwrap();
    let api = MemoryShoovApi::new();

    api.fail_lookups_with(502);
    let err = api.find_repository("owner/site").await.unwrap_err();
    assert!(matches!(err, ApiError::BackendUnavailable { status: 502, .. }));

    api.fail_uploads_with(401);
    let err = api
        .upload_screenshot(&write_artifacts(dir.path(), "home"))
        .await
        .unwrap_err();
    assert!(err.is_credential_failure());
}

#[tokio::test]
async fn calls_are_counted_per_endpoint() {
    let api = MemoryShoovApi::new();
    let (repo, build) = api.seed_repository("owner/site");

    api.find_repository("owner/site").await.unwrap();
    api.latest_build(&repo).await.unwrap();
    api.count_screenshots(&build, "x").await.unwrap();

    let calls = api.calls();
    assert_eq!(calls.repositories, 1);
    assert_eq!(calls.builds, 1);
    assert_eq!(calls.screenshots, 1);
    assert_eq!(calls.uploads, 0);
    assert_eq!(calls.total(), 3);
}
