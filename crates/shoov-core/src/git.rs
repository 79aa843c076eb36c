//! Git metadata attached to every upload.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::directory::RepositoryIdentity;
use crate::error::{Result, ShoovError};

/// Snapshot of the repository the tests run in. Collected once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMetadata {
    pub commit: String,
    pub branch: String,
    pub subject: String,
    pub origin_url: String,
    /// Path of the working directory relative to the repository root
    pub path_prefix: String,
}

impl GitMetadata {
    /// Run the git queries concurrently in `repo_dir`.
    ///
    /// Fails if `repo_dir` is not a git work tree or has no `origin` remote.
    pub async fn collect(repo_dir: &Path) -> Result<Self> {
        let (commit, branch, subject, path_prefix, origin_url) = tokio::try_join!(
            git_output(repo_dir, &["rev-parse", "HEAD"]),
            git_output(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"]),
            git_output(repo_dir, &["log", "HEAD", "-1", "--format=%s"]),
            git_output(repo_dir, &["rev-parse", "--show-prefix"]),
            git_output(repo_dir, &["config", "--get", "remote.origin.url"]),
        )?;

        Ok(GitMetadata {
            commit,
            branch,
            subject,
            origin_url,
            path_prefix,
        })
    }

    /// `owner/name` form of the origin URL.
    pub fn repository(&self) -> RepositoryIdentity {
        RepositoryIdentity::from_origin_url(&self.origin_url)
    }
}

async fn git_output(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ShoovError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ShoovError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
