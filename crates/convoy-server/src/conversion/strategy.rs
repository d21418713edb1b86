//! Conversion strategies
//!
//! A strategy drives one prepared job through the remote client. The
//! synchronous strategy blocks until the output is installed; the
//! asynchronous one returns as soon as the service has accepted the job and
//! leaves completion to the callback.

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::dispatcher::DispatchError;
use super::materializer::{Materializer, TempFileGuard};
use super::request::{InputPayload, JobResult, PreparedJob};
use crate::remote::{ConversionClient, JobMode, RemoteJob};
use crate::storage::ArtifactStore;

/// Which strategies the dispatcher may pick from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Async when the request allows it, sync otherwise
    Auto,
    /// Always sync
    Blocking,
}

#[derive(Debug, Error)]
#[error("Unknown conversion strategy '{0}'")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(StrategyKind::Auto),
            "blocking" | "sync" => Ok(StrategyKind::Blocking),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

#[async_trait]
pub trait ConversionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        client: &dyn ConversionClient,
        job: &PreparedJob,
    ) -> Result<JobResult, DispatchError>;
}

/// Create and start a job, streaming the source when the payload is an upload
async fn submit(
    client: &dyn ConversionClient,
    store: &dyn ArtifactStore,
    job: &PreparedJob,
) -> Result<RemoteJob, DispatchError> {
    let request = &job.request;
    let remote = client
        .create_job(&request.format_in, &request.format_out, JobMode::Convert)
        .await?;
    let remote = client.start(&remote, &job.options).await?;

    if let InputPayload::Upload(source) = &job.payload {
        let reader = store
            .open_for_read(source)
            .await
            .map_err(DispatchError::Store)?;
        client.upload(&remote, &source.filename, reader).await?;
    }

    Ok(remote)
}

/// Blocks until the remote job finishes, then installs the output
pub struct SyncStrategy {
    materializer: Arc<Materializer>,
}

impl SyncStrategy {
    pub fn new(materializer: Arc<Materializer>) -> Self {
        Self { materializer }
    }
}

#[async_trait]
impl ConversionStrategy for SyncStrategy {
    fn name(&self) -> &'static str {
        "sync"
    }

    #[instrument(skip_all, fields(target = %job.target_path.display()))]
    async fn execute(
        &self,
        client: &dyn ConversionClient,
        job: &PreparedJob,
    ) -> Result<JobResult, DispatchError> {
        let remote = submit(client, self.materializer.store().as_ref(), job).await?;

        // Covers a failed or partial download; materialize removes it otherwise
        let _cleanup = TempFileGuard::new(&job.temp_path);

        let remote = client.wait(&remote).await?;
        client.download(&remote, &job.temp_path).await?;
        debug!(job_id = %remote.id, "Output staged");

        match self
            .materializer
            .materialize(&job.owner, &job.temp_path, &job.target_path)
            .await
        {
            Some(artifact) => {
                info!(job_id = %remote.id, artifact = %artifact.id, "Conversion completed");
                Ok(JobResult::Completed { artifact })
            }
            None => Ok(JobResult::Failed {
                reason: format!("could not install output for job {}", remote.id),
            }),
        }
    }
}

/// Submits the job with a callback URL and returns immediately
pub struct AsyncStrategy {
    store: Arc<dyn ArtifactStore>,
    callback_url: String,
}

impl AsyncStrategy {
    pub fn new(store: Arc<dyn ArtifactStore>, callback_url: impl Into<String>) -> Self {
        Self {
            store,
            callback_url: callback_url.into(),
        }
    }
}

#[async_trait]
impl ConversionStrategy for AsyncStrategy {
    fn name(&self) -> &'static str {
        "async"
    }

    #[instrument(skip_all, fields(target = %job.target_path.display()))]
    async fn execute(
        &self,
        client: &dyn ConversionClient,
        job: &PreparedJob,
    ) -> Result<JobResult, DispatchError> {
        let mut with_callback = job.clone();
        with_callback.options.insert(
            "callback".to_string(),
            serde_json::Value::String(self.callback_url.clone()),
        );

        let remote = submit(client, self.store.as_ref(), &with_callback).await?;
        info!(job_id = %remote.id, "Conversion submitted");
        Ok(JobResult::Pending { job_id: remote.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!("auto".parse::<StrategyKind>().ok(), Some(StrategyKind::Auto));
        assert_eq!("Blocking".parse::<StrategyKind>().ok(), Some(StrategyKind::Blocking));
        assert_eq!("sync".parse::<StrategyKind>().ok(), Some(StrategyKind::Blocking));
        assert!("shell:convert.sh".parse::<StrategyKind>().is_err());
    }
}
