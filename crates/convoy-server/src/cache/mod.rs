//! Fingerprint cache
//!
//! A single key/value namespace holding two disjoint key families:
//!
//! - `staleness:{md5(source_id ++ output_path)}` → last seen source marker
//! - `job:{remote_job_id}` → serialized [`PendingJob`]
//!
//! Backends implement [`CacheStore`] (one atomic get/set/remove per call);
//! [`FingerprintCache`] is the typed facade the dispatcher and the callback
//! resolver go through. Nothing composes multiple calls into a transaction.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use convoy_common::hash::fingerprint;

use crate::conversion::request::PendingJob;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

const STALENESS_PREFIX: &str = "staleness:";
const JOB_PREFIX: &str = "job:";

/// Errors raised by cache backends
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache entry is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Raw key/value backend
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Returns whether an entry was removed
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;
}

/// Key of a staleness record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StalenessKey(String);

impl StalenessKey {
    pub fn new(source_id: &str, output_path: &Path) -> Self {
        let output = output_path.to_string_lossy();
        Self(format!("{}{}", STALENESS_PREFIX, fingerprint(&[source_id, &output])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StalenessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn job_key(job_id: &str) -> String {
    format!("{}{}", JOB_PREFIX, job_id)
}

/// Typed access to staleness records and pending jobs
#[derive(Clone)]
pub struct FingerprintCache {
    store: Arc<dyn CacheStore>,
}

impl FingerprintCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// In-memory cache, lost on restart
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    /// Last recorded source marker.
    ///
    /// Values that do not parse, and zero, read as absent.
    pub async fn marker(&self, key: &StalenessKey) -> Result<Option<i64>, CacheError> {
        let raw = self.store.get(key.as_str()).await?;
        Ok(raw
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|marker| *marker != 0))
    }

    pub async fn record_marker(&self, key: &StalenessKey, marker: i64) -> Result<(), CacheError> {
        debug!(key = %key, marker, "Recording source marker");
        self.store.set(key.as_str(), &marker.to_string()).await
    }

    pub async fn pending_job(&self, job_id: &str) -> Result<Option<PendingJob>, CacheError> {
        match self.store.get(&job_key(job_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn register_pending_job(&self, job: &PendingJob) -> Result<(), CacheError> {
        let value = serde_json::to_string(job)?;
        debug!(job_id = %job.job_id, "Registering pending job");
        self.store.set(&job_key(&job.job_id), &value).await
    }

    pub async fn forget_pending_job(&self, job_id: &str) -> Result<bool, CacheError> {
        self.store.remove(&job_key(job_id)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::conversion::request::{ConversionRequest, InputMode, SourceRef, TrackedSource};
    use crate::storage::OwnerRef;
    use std::path::PathBuf;

    fn pending(job_id: &str) -> PendingJob {
        PendingJob {
            job_id: job_id.to_string(),
            request: ConversionRequest {
                source: SourceRef::Trackable(TrackedSource {
                    id: "docs/a.docx".to_string(),
                    marker: 10,
                    owner: OwnerRef::new("docs"),
                    path: PathBuf::from("/srv/docs/a.docx"),
                    url: "http://media.test/docs/a.docx".to_string(),
                }),
                input: InputMode::Download,
                output_path: None,
                format_in: "docx".to_string(),
                format_out: "pdf".to_string(),
                owner: Some(OwnerRef::new("docs")),
                extra: serde_json::Map::new(),
            },
            target_path: PathBuf::from("/srv/docs/a.pdf"),
            temp_path: PathBuf::from("/srv/docs/0f.pdf"),
        }
    }

    #[test]
    fn test_staleness_key_shape() {
        let key = StalenessKey::new("docs/a.docx", Path::new("/srv/docs/a.pdf"));
        assert!(key.as_str().starts_with("staleness:"));
        assert_eq!(key.as_str().len(), "staleness:".len() + 32);
        assert_ne!(key, StalenessKey::new("docs/a.docx", Path::new("/srv/docs/a.png")));
    }

    #[tokio::test]
    async fn test_marker_roundtrip() {
        let cache = FingerprintCache::in_memory();
        let key = StalenessKey::new("docs/a.docx", Path::new("/srv/docs/a.pdf"));

        assert_eq!(cache.marker(&key).await.unwrap(), None);
        cache.record_marker(&key, 1_700_000_000).await.unwrap();
        assert_eq!(cache.marker(&key).await.unwrap(), Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_zero_and_garbage_markers_read_as_absent() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = FingerprintCache::new(store.clone());
        let key = StalenessKey::new("docs/a.docx", Path::new("/srv/docs/a.pdf"));

        store.set(key.as_str(), "0").await.unwrap();
        assert_eq!(cache.marker(&key).await.unwrap(), None);

        store.set(key.as_str(), "yesterday").await.unwrap();
        assert_eq!(cache.marker(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pending_job_roundtrip() {
        let cache = FingerprintCache::in_memory();
        let job = pending("abc123");

        assert!(cache.pending_job("abc123").await.unwrap().is_none());
        cache.register_pending_job(&job).await.unwrap();
        assert_eq!(cache.pending_job("abc123").await.unwrap(), Some(job));

        assert!(cache.forget_pending_job("abc123").await.unwrap());
        assert!(cache.pending_job("abc123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_pending_job_is_an_error() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = FingerprintCache::new(store.clone());
        store.set("job:broken", "{not json").await.unwrap();

        assert!(matches!(
            cache.pending_job("broken").await,
            Err(CacheError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_key_families_do_not_collide() {
        let cache = FingerprintCache::in_memory();
        let key = StalenessKey::new("x", Path::new("y"));
        let job_id = key.as_str().trim_start_matches(STALENESS_PREFIX).to_string();

        cache.record_marker(&key, 5).await.unwrap();
        assert!(cache.pending_job(&job_id).await.unwrap().is_none());
    }
}
