//! Remote directory: repository and build resolution.
//!
//! The origin URL is normalized to `owner/name` before it is used as the
//! repository label. A label or build the backend does not know is a normal
//! outcome (`Ok(None)`); only transport and status failures are errors.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use shoov_api::{BuildId, RepositoryId, ShoovApi};
use tracing::{debug, info};

use crate::error::Result;

/// `scheme://[credentials@]host[:port]/`
fn url_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://(?:[^@/]*@)?[^/]+/").expect("static pattern")
    })
}

/// scp-like `[user@]host:`
fn scp_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[^@/:]+@)?[^@/:]+:").expect("static pattern"))
}

/// Stable `owner/name` identity of the repository under test.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryIdentity(String);

impl RepositoryIdentity {
    /// Normalize an origin URL.
    ///
    /// Handles `https://[user[:token]@]host/owner/name(.git)`,
    /// `git://host/owner/name`, `ssh://git@host:22/owner/name.git` and
    /// `git@host:owner/name.git`.
    pub fn from_origin_url(origin_url: &str) -> Self {
        let trimmed = origin_url.trim();
        let without_host = if url_prefix().is_match(trimmed) {
            url_prefix().replace(trimmed, "")
        } else {
            scp_prefix().replace(trimmed, "")
        };

        let mut label = without_host.trim_end_matches('/');
        label = label.strip_suffix(".git").unwrap_or(label);
        RepositoryIdentity(label.trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves repository identity to remote ids.
#[derive(Clone)]
pub struct RemoteDirectory {
    api: Arc<dyn ShoovApi>,
}

impl RemoteDirectory {
    pub fn new(api: Arc<dyn ShoovApi>) -> Self {
        Self { api }
    }

    /// Remote repository id for `identity`, `None` if it was never registered.
    pub async fn resolve_repository(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Option<RepositoryId>> {
        let found = self.api.find_repository(identity.as_str()).await?;
        match &found {
            Some(id) => debug!(repository = %identity, id = %id, "Repository resolved"),
            None => info!(repository = %identity, "Repository not registered yet"),
        }
        Ok(found)
    }

    /// Most recent build of `repository`, `None` if it has none.
    pub async fn resolve_build(&self, repository: &RepositoryId) -> Result<Option<BuildId>> {
        let found = self.api.latest_build(repository).await?;
        match &found {
            Some(id) => debug!(repository = %repository, build = %id, "Build resolved"),
            None => info!(repository = %repository, "No build registered yet"),
        }
        Ok(found)
    }
}
