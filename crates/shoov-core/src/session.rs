//! Session-scoped state of one reporting run.
//!
//! Both pieces only ever grow: the seen set never forgets a key and the
//! build id, once known, is never replaced. Several sessions in one process
//! (parallel shards) each own their own `SessionContext`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use shoov_api::{BuildId, RepositoryId};
use uuid::Uuid;

use crate::fingerprint::UNSCOPED;

/// Keys of comparison results already evaluated in this session.
#[derive(Debug, Default)]
pub struct SeenResultSet {
    keys: HashSet<String>,
}

impl SeenResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`; returns `true` when it had not been seen before.
    pub fn insert(&mut self, key: &str) -> bool {
        self.keys.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Remote ids shared between the evaluation path and upload tasks.
///
/// First resolution wins: whichever of directory lookup or upload response
/// sets the build id first, later values are ignored.
#[derive(Debug, Default)]
pub struct BuildContext {
    repository: OnceLock<RepositoryId>,
    build: OnceLock<BuildId>,
    resolution_attempted: AtomicBool,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repository_id(&self) -> Option<&RepositoryId> {
        self.repository.get()
    }

    pub fn build_id(&self) -> Option<&BuildId> {
        self.build.get()
    }

    /// Record the repository id; ignored if one is already set.
    pub fn set_repository(&self, repository: RepositoryId) {
        let _ = self.repository.set(repository);
    }

    /// Adopt `build` unless a build id is already known.
    ///
    /// Returns `true` when this call set it.
    pub fn adopt_build(&self, build: BuildId) -> bool {
        self.build.set(build).is_ok()
    }

    /// Fingerprint scope: the best-known build id, or [`UNSCOPED`].
    pub fn scope(&self) -> &str {
        self.build_id().map(|b| b.0.as_str()).unwrap_or(UNSCOPED)
    }

    /// Whether the directory lookup already ran (successfully or not).
    pub fn resolution_attempted(&self) -> bool {
        self.resolution_attempted.load(Ordering::Acquire)
    }

    pub fn mark_resolution_attempted(&self) {
        self.resolution_attempted.store(true, Ordering::Release);
    }
}

/// State owned by one reporting session.
#[derive(Debug)]
pub struct SessionContext {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub seen: SeenResultSet,
    pub build: Arc<BuildContext>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            seen: SeenResultSet::new(),
            build: Arc::new(BuildContext::new()),
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_set_reports_first_insert_only() {
        let mut seen = SeenResultSet::new();
        assert!(seen.insert("home"));
        assert!(!seen.insert("home"));
        assert!(seen.contains("home"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_first_build_wins() {
        let ctx = BuildContext::new();
        assert_eq!(ctx.scope(), UNSCOPED);

        assert!(ctx.adopt_build(BuildId("7".to_string())));
        assert!(!ctx.adopt_build(BuildId("8".to_string())));

        assert_eq!(ctx.build_id(), Some(&BuildId("7".to_string())));
        assert_eq!(ctx.scope(), "7");
    }

    #[test]
    fn test_resolution_flag() {
        let ctx = BuildContext::new();
        assert!(!ctx.resolution_attempted());
        ctx.mark_resolution_attempted();
        assert!(ctx.resolution_attempted());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mut a = SessionContext::new();
        let b = SessionContext::new();
        a.seen.insert("home");
        a.build.adopt_build(BuildId("1".to_string()));

        assert_ne!(a.id, b.id);
        assert!(!b.seen.contains("home"));
        assert_eq!(b.build.build_id(), None);
    }
}
