//! Content fingerprints for regression deduplication.
//!
//! Each artifact is hashed on its own (SHA-256, streamed), the hex digests
//! are concatenated in artifact order followed by the scope, and the
//! concatenation is hashed again. Labels and tags never take part.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::comparison::ArtifactSet;
use crate::error::{Result, ShoovError};

/// Scope used while no build id is known for the session.
pub const UNSCOPED: &str = "unscoped";

const READ_CHUNK: usize = 64 * 1024;

/// SHA-256 hex digest identifying a regression's content within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }

    #[cfg(test)]
    pub(crate) fn from_hex_unchecked(hex: &str) -> Self {
        Fingerprint(hex.to_string())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash one file without loading it into memory.
async fn hash_file(path: &Path) -> Result<String> {
    let io_err = |source| ShoovError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprint an ordered sequence of files within `scope`.
///
/// Fails with [`ShoovError::Io`] on the first unreadable file.
pub async fn fingerprint_files(paths: &[&Path], scope: &str) -> Result<Fingerprint> {
    let mut outer = Sha256::new();
    for path in paths {
        let digest = hash_file(path).await?;
        outer.update(digest.as_bytes());
    }
    outer.update(scope.as_bytes());

    let fingerprint = Fingerprint(hex::encode(outer.finalize()));
    debug!(fingerprint = %fingerprint.short(), scope = %scope, "Computed fingerprint");
    Ok(fingerprint)
}

/// Fingerprint a comparison's artifact triple within `scope`.
pub async fn fingerprint_artifacts(artifacts: &ArtifactSet, scope: &str) -> Result<Fingerprint> {
    fingerprint_files(&artifacts.paths(), scope).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_set(dir: &Path, prefix: &str, diff: &[u8]) -> ArtifactSet {
        let set = ArtifactSet::new(
            dir.join(format!("{prefix}.baseline.png")),
            dir.join(format!("{prefix}.regression.png")),
            dir.join(format!("{prefix}.diff.png")),
        );
        std::fs::write(&set.baseline, b"baseline-bytes").unwrap();
        std::fs::write(&set.regression, b"regression-bytes").unwrap();
        std::fs::write(&set.diff, diff).unwrap();
        set
    }

    #[tokio::test]
    async fn test_fingerprint_deterministic() {
        let dir = tempdir().unwrap();
        let set = write_set(dir.path(), "home", b"diff-bytes");

        let fp1 = fingerprint_artifacts(&set, "42").await.unwrap();
        let fp2 = fingerprint_artifacts(&set, "42").await.unwrap();

        assert_eq!(fp1, fp2);
        assert_eq!(fp1.as_str().len(), 64); // SHA256 hex
    }

    #[tokio::test]
    async fn test_fingerprint_ignores_file_names() {
        let dir = tempdir().unwrap();
        let a = write_set(dir.path(), "home", b"diff-bytes");
        let b = write_set(dir.path(), "landing", b"diff-bytes");

        assert_eq!(
            fingerprint_artifacts(&a, "42").await.unwrap(),
            fingerprint_artifacts(&b, "42").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_single_byte_change_changes_fingerprint() {
        let dir = tempdir().unwrap();
        let a = write_set(dir.path(), "a", b"diff-bytes-0");
        let b = write_set(dir.path(), "b", b"diff-bytes-1");

        assert_ne!(
            fingerprint_artifacts(&a, "42").await.unwrap(),
            fingerprint_artifacts(&b, "42").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_scope_changes_fingerprint() {
        let dir = tempdir().unwrap();
        let set = write_set(dir.path(), "home", b"diff-bytes");

        assert_ne!(
            fingerprint_artifacts(&set, "42").await.unwrap(),
            fingerprint_artifacts(&set, UNSCOPED).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_artifact_order_matters() {
        let dir = tempdir().unwrap();
        let set = write_set(dir.path(), "home", b"diff-bytes");
        let swapped = ArtifactSet::new(&set.regression, &set.baseline, &set.diff);

        assert_ne!(
            fingerprint_artifacts(&set, "1").await.unwrap(),
            fingerprint_artifacts(&swapped, "1").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_large_file_streams() {
        let dir = tempdir().unwrap();
        let big = dir.path().join("big.png");
        std::fs::write(&big, vec![0xABu8; 1_100_000]).unwrap(); // ~1.1 MB

        let fp = fingerprint_files(&[big.as_path()], "s").await.unwrap();
        assert_eq!(fp.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_missing_diff_is_io_error_with_path() {
        let dir = tempdir().unwrap();
        let set = write_set(dir.path(), "home", b"diff");
        std::fs::remove_file(&set.diff).unwrap();

        let err = fingerprint_artifacts(&set, "42").await.unwrap_err();
        match err {
            ShoovError::Io { path, .. } => assert_eq!(path, set.diff),
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}
