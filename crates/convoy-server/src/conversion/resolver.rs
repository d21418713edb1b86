//! Callback resolver
//!
//! Reached from an unauthenticated endpoint, so every failure is logged and
//! reported as `false`; nothing propagates.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::materializer::Materializer;
use crate::cache::FingerprintCache;
use crate::remote::CallbackFetcher;

pub struct CallbackResolver {
    cache: FingerprintCache,
    fetcher: Arc<dyn CallbackFetcher>,
    materializer: Arc<Materializer>,
    forget_completed: bool,
}

impl CallbackResolver {
    pub fn new(
        cache: FingerprintCache,
        fetcher: Arc<dyn CallbackFetcher>,
        materializer: Arc<Materializer>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            materializer,
            forget_completed: false,
        }
    }

    /// Drop the pending job entry once its output is installed
    pub fn forget_completed(mut self, forget: bool) -> Self {
        self.forget_completed = forget;
        self
    }

    /// Complete the async job `job_id` whose status lives at `status_url`.
    ///
    /// Returns whether an artifact was installed. Unknown ids are a no-op, and
    /// repeating a successful call re-installs the same output.
    #[instrument(skip(self))]
    pub async fn handle(&self, job_id: &str, status_url: &str) -> bool {
        let pending = match self.cache.pending_job(job_id).await {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                debug!("No pending job with this id");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read pending job");
                return false;
            }
        };

        let status = match self.fetcher.fetch_status(status_url).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Failed to fetch job status");
                return false;
            }
        };
        let Some(output_url) = status.output_url() else {
            debug!(step = ?status.step, "Job has no output yet");
            return false;
        };

        let bytes = match self.fetcher.fetch_bytes(output_url).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                warn!("Job output is empty");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch job output");
                return false;
            }
        };

        let Some(owner) = pending.request.effective_owner().cloned() else {
            warn!("Pending job has no owner");
            return false;
        };

        let store = self.materializer.store();
        if let Err(e) = store.write(&pending.temp_path, &bytes).await {
            warn!(error = %e, "Failed to stage job output");
            if let Err(e) = store.remove(&pending.temp_path).await {
                warn!(error = %e, "Failed to remove partial output");
            }
            return false;
        }

        let Some(artifact) = self
            .materializer
            .materialize(&owner, &pending.temp_path, &pending.target_path)
            .await
        else {
            return false;
        };
        info!(artifact = %artifact.id, "Async conversion completed");

        if self.forget_completed {
            if let Err(e) = self.cache.forget_pending_job(job_id).await {
                warn!(error = %e, "Failed to forget completed job");
            }
        }
        true
    }
}
