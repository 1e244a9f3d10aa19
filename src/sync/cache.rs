//! Query cache capability.
//!
//! The coordinator never writes data into the cache. It only marks the
//! project's views stale so the next read refetches them.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use super::channel::ProjectId;

/// Cached view families keyed per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    /// Task list of a project.
    Tasks,
    /// Board columns and items of a project.
    Board,
}

impl std::fmt::Display for QueryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryScope::Tasks => write!(f, "tasks"),
            QueryScope::Board => write!(f, "board"),
        }
    }
}

/// Scoped query identifier, e.g. `tasks:P1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QueryKey {
    pub scope: QueryScope,
    pub project_id: ProjectId,
}

impl QueryKey {
    pub fn new(scope: QueryScope, project_id: ProjectId) -> Self {
        Self { scope, project_id }
    }

    /// Every key a project's invalidation touches.
    pub fn scoped_to(project_id: &ProjectId) -> [QueryKey; 2] {
        [
            QueryKey::new(QueryScope::Tasks, project_id.clone()),
            QueryKey::new(QueryScope::Board, project_id.clone()),
        ]
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scope, self.project_id)
    }
}

/// External data cache, handed to the coordinator at construction.
pub trait QueryCache: Send + Sync {
    /// Mark `key` stale. Must be idempotent.
    fn invalidate(&self, key: &QueryKey);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EntryState {
    stale: bool,
    invalidations: u64,
}

/// Cache that only tracks staleness, for the CLI and tests.
#[derive(Debug, Default)]
pub struct InMemoryQueryCache {
    entries: Mutex<HashMap<QueryKey, EntryState>>,
}

impl InMemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.with_entries(|entries| entries.get(key).is_some_and(|e| e.stale))
    }

    /// Record a refetch: the entry is fresh until the next invalidation.
    pub fn mark_fresh(&self, key: &QueryKey) {
        self.with_entries(|entries| {
            entries.entry(key.clone()).or_default().stale = false;
        })
    }

    pub fn invalidation_count(&self, key: &QueryKey) -> u64 {
        self.with_entries(|entries| entries.get(key).map_or(0, |e| e.invalidations))
    }

    /// Sum of invalidations across every key of `project_id`.
    pub fn project_invalidations(&self, project_id: &ProjectId) -> u64 {
        self.with_entries(|entries| {
            entries
                .iter()
                .filter(|(key, _)| &key.project_id == project_id)
                .map(|(_, e)| e.invalidations)
                .sum()
        })
    }

    pub fn stale_keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.with_entries(|entries| {
            entries
                .iter()
                .filter(|(_, e)| e.stale)
                .map(|(k, _)| k.clone())
                .collect()
        });
        keys.sort();
        keys
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<QueryKey, EntryState>) -> R) -> R {
        // A panic while holding the lock cannot leave an entry half-written.
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut entries)
    }
}

impl QueryCache for InMemoryQueryCache {
    fn invalidate(&self, key: &QueryKey) {
        self.with_entries(|entries| {
            let entry = entries.entry(key.clone()).or_default();
            entry.stale = true;
            entry.invalidations += 1;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ProjectId {
        ProjectId::new(s).unwrap()
    }

    #[test]
    fn test_scoped_keys_cover_tasks_and_board() {
        let keys = QueryKey::scoped_to(&pid("P1"));
        assert_eq!(keys[0].to_string(), "tasks:P1");
        assert_eq!(keys[1].to_string(), "board:P1");
    }

    #[test]
    fn test_invalidate_marks_stale() {
        let cache = InMemoryQueryCache::new();
        let key = QueryKey::new(QueryScope::Tasks, pid("P1"));
        assert!(!cache.is_stale(&key));
        cache.invalidate(&key);
        assert!(cache.is_stale(&key));
        assert_eq!(cache.invalidation_count(&key), 1);
    }

    #[test]
    fn test_duplicate_invalidation_is_idempotent() {
        let cache = InMemoryQueryCache::new();
        let key = QueryKey::new(QueryScope::Board, pid("P1"));
        cache.invalidate(&key);
        let after_one = cache.stale_keys();
        cache.invalidate(&key);
        cache.invalidate(&key);
        assert_eq!(cache.stale_keys(), after_one);
        assert_eq!(cache.invalidation_count(&key), 3);
    }

    #[test]
    fn test_mark_fresh_clears_stale() {
        let cache = InMemoryQueryCache::new();
        let key = QueryKey::new(QueryScope::Tasks, pid("P1"));
        cache.invalidate(&key);
        cache.mark_fresh(&key);
        assert!(!cache.is_stale(&key));
        assert_eq!(cache.invalidation_count(&key), 1);
    }

    #[test]
    fn test_project_invalidations_are_scoped() {
        let cache = InMemoryQueryCache::new();
        for key in QueryKey::scoped_to(&pid("P1")) {
            cache.invalidate(&key);
        }
        cache.invalidate(&QueryKey::new(QueryScope::Tasks, pid("P2")));
        assert_eq!(cache.project_invalidations(&pid("P1")), 2);
        assert_eq!(cache.project_invalidations(&pid("P2")), 1);
        assert_eq!(cache.project_invalidations(&pid("P3")), 0);
    }
}
