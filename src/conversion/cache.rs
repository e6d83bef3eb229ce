//! Fast-path lookup of recently completed jobs.
//!
//! The orchestrator records artifacts here when a conversion succeeds so the
//! following download does not need a database round trip. Entries live for
//! the process lifetime only; a miss falls back to the tracking store.

use dashmap::DashMap;
use readly_db::models::JobArtifacts;
use std::time::Instant;

/// Key-value store for completed job artifacts.
pub trait JobCache: Send + Sync {
    fn get(&self, job_id: &str) -> Option<JobArtifacts>;

    /// Insert a complete entry. Readers never observe a partial value.
    fn insert(&self, job_id: &str, artifacts: JobArtifacts);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct CacheEntry {
    artifacts: JobArtifacts,
    inserted_at: Instant,
}

/// In-process cache that evicts the oldest entry once full.
pub struct BoundedJobCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
}

impl BoundedJobCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl JobCache for BoundedJobCache {
    fn get(&self, job_id: &str) -> Option<JobArtifacts> {
        self.entries
            .get(job_id)
            .map(|entry| entry.artifacts.clone())
    }

    fn insert(&self, job_id: &str, artifacts: JobArtifacts) {
        if !self.entries.contains_key(job_id) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }

        self.entries.insert(
            job_id.to_string(),
            CacheEntry {
                artifacts,
                inserted_at: Instant::now(),
            },
        );
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cache that stores nothing. Every lookup goes to the tracking store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopJobCache;

impl JobCache for NoopJobCache {
    fn get(&self, _job_id: &str) -> Option<JobArtifacts> {
        None
    }

    fn insert(&self, _job_id: &str, _artifacts: JobArtifacts) {}

    fn len(&self) -> usize {
        0
    }
}
