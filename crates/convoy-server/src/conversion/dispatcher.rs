//! Job dispatcher
//!
//! Entry point of the conversion core. For each request it settles the
//! execution mode, checks the staleness record, and hands a prepared job to
//! the sync or async strategy. Async jobs are registered in the fingerprint
//! cache so the callback can find them later.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::credential::Credential;
use super::materializer::Materializer;
use super::paths::{derive_output_path, derive_temp_path};
use super::request::{
    ConversionRequest, DispatchOutcome, InputMode, InputPayload, JobResult, PendingJob,
    PreparedJob, SourceRef, TrackedSource,
};
use super::strategy::{AsyncStrategy, ConversionStrategy, StrategyKind, SyncStrategy};
use crate::cache::{CacheError, FingerprintCache, StalenessKey};
use crate::config::ConversionConfig;
use crate::remote::{ClientFactory, RemoteError};
use crate::storage::{Artifact, ArtifactStore, Owner, OwnerRef};

/// Failures that surface to the caller of [`JobDispatcher::convert`]
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Remote conversion failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Fingerprint cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Artifact store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Owner {0} not found")]
    UnknownOwner(OwnerRef),

    #[error("Output path {} must name a file directly inside the owner directory", .0.display())]
    OutputNotAllowed(PathBuf),
}

/// Whether a caller address can receive callbacks from the remote service
pub fn is_local_origin(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}

pub struct JobDispatcher {
    credential: Credential,
    factory: Arc<dyn ClientFactory>,
    cache: FingerprintCache,
    store: Arc<dyn ArtifactStore>,
    default_async: bool,
    default_input: InputMode,
    strategy: String,
    sync_strategy: SyncStrategy,
    async_strategy: AsyncStrategy,
}

impl JobDispatcher {
    pub fn new(
        config: &ConversionConfig,
        credential: Credential,
        factory: Arc<dyn ClientFactory>,
        cache: FingerprintCache,
        materializer: Arc<Materializer>,
    ) -> Self {
        let store = materializer.store().clone();
        Self {
            credential,
            factory,
            cache,
            store: store.clone(),
            default_async: config.default_async,
            default_input: config.input,
            strategy: config.strategy.clone(),
            sync_strategy: SyncStrategy::new(materializer),
            async_strategy: AsyncStrategy::new(store, config.callback_url()),
        }
    }

    /// Configured default for requests that do not choose an input mode
    pub fn default_input(&self) -> InputMode {
        self.default_input
    }

    /// Convert `request`, or return the cached output when it is still fresh.
    ///
    /// `Ok(None)` means the request was skipped: no usable credential, an
    /// unknown strategy name, or an opaque source without an output path.
    #[instrument(skip(self, request), fields(format_out = %request.format_out))]
    pub async fn convert(
        &self,
        mut request: ConversionRequest,
        explicit_output: Option<PathBuf>,
        force_async: Option<bool>,
        origin: IpAddr,
    ) -> Result<Option<DispatchOutcome>, DispatchError> {
        // Loopback callers cannot be called back or fetched from
        let local = is_local_origin(origin);
        let run_async = force_async.unwrap_or(self.default_async) && !local;
        if local && request.input == InputMode::Download {
            debug!("Local origin, switching input to upload");
            request.input = InputMode::Upload;
        }

        let Some(api_key) = self.credential.resolve() else {
            warn!("No conversion API key configured, skipping conversion");
            return Ok(None);
        };
        let client = match self.factory.build(&api_key) {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Failed to create conversion client");
                return Ok(None);
            }
        };

        let kind = match self.strategy.parse::<StrategyKind>() {
            Ok(kind) => kind,
            Err(e) => {
                error!(error = %e, "Invalid conversion strategy, skipping conversion");
                return Ok(None);
            }
        };

        let source = match &request.source {
            SourceRef::Trackable(source) => source.clone(),
            SourceRef::Opaque { path } => {
                let Some(output) = explicit_output.or_else(|| request.output_path.clone()) else {
                    return Ok(None);
                };
                if !self.store.contains(&output) {
                    warn!(output = %output.display(), "Output path outside the artifact store");
                    return Err(DispatchError::OutputNotAllowed(output));
                }
                let exists = self.store.exists(&output).await?;
                debug!(source = %path.display(), exists, "Untracked source, reporting output only");
                return Ok(Some(DispatchOutcome::Untracked {
                    path: output,
                    exists,
                }));
            }
        };

        let output = explicit_output
            .or_else(|| request.output_path.clone())
            .unwrap_or_else(|| derive_output_path(&source.path, &request.format_out));
        let owner = request
            .effective_owner()
            .cloned()
            .unwrap_or_else(|| source.owner.clone());

        // Outputs are installed as `owner.root/basename`
        let resolved = self
            .store
            .resolve_owner(&owner)
            .await?
            .ok_or_else(|| DispatchError::UnknownOwner(owner.clone()))?;
        let in_owner_root = output.file_name().is_some()
            && output.parent() == Some(resolved.root.as_path());
        if !in_owner_root {
            warn!(
                output = %output.display(),
                owner = %owner,
                "Output path outside the owner directory"
            );
            return Err(DispatchError::OutputNotAllowed(output));
        }

        // TODO: consult pending jobs for this target before dispatching, so a
        // conversion already in flight is not submitted a second time.
        let key = StalenessKey::new(&source.id, &output);
        let stale = match self.cache.marker(&key).await? {
            Some(cached) => cached < source.marker,
            None => true,
        };
        if stale {
            self.cache.record_marker(&key, source.marker).await?;
            debug!(source = %source.id, marker = source.marker, "Source changed, converting");
        } else if let Some(artifact) = self.existing_output(&resolved, &output).await? {
            debug!(artifact = %artifact.id, "Output is fresh");
            return Ok(Some(DispatchOutcome::Cached(artifact)));
        }

        request.output_path = Some(output.clone());
        request.owner = Some(owner.clone());
        let prepared = self.prepare(request, &source, owner, output).await?;

        let strategy: &dyn ConversionStrategy = match (kind, run_async) {
            (StrategyKind::Auto, true) => &self.async_strategy,
            _ => &self.sync_strategy,
        };
        info!(strategy = strategy.name(), source = %source.id, "Dispatching conversion");

        let result = strategy.execute(client.as_ref(), &prepared).await?;

        if let JobResult::Pending { job_id } = &result {
            self.cache
                .register_pending_job(&PendingJob {
                    job_id: job_id.clone(),
                    request: prepared.request,
                    target_path: prepared.target_path,
                    temp_path: prepared.temp_path,
                })
                .await?;
        }

        Ok(Some(DispatchOutcome::Dispatched(result)))
    }

    async fn existing_output(
        &self,
        owner: &Owner,
        output: &Path,
    ) -> Result<Option<Artifact>, DispatchError> {
        let Some(filename) = output.file_name().and_then(|name| name.to_str()) else {
            return Ok(None);
        };
        Ok(self
            .store
            .find_artifact(owner, filename)
            .await?
            .filter(|artifact| artifact.canonical_path() == output))
    }

    async fn prepare(
        &self,
        request: ConversionRequest,
        source: &TrackedSource,
        owner: OwnerRef,
        output: PathBuf,
    ) -> Result<PreparedJob, DispatchError> {
        let payload = match request.input {
            InputMode::Download => InputPayload::Download {
                url: source.url.clone(),
            },
            InputMode::Upload => InputPayload::Upload(self.source_artifact(source).await?),
        };

        let mut options = request.extra.clone();
        options.insert("inputformat".into(), request.format_in.clone().into());
        options.insert("outputformat".into(), request.format_out.clone().into());
        options.insert("input".into(), request.input.as_str().into());
        if let InputPayload::Download { url } = &payload {
            options.insert("file".into(), url.clone().into());
        }
        if let Some(filename) = source.filename() {
            options
                .entry("filename")
                .or_insert_with(|| filename.to_string().into());
        }

        Ok(PreparedJob {
            temp_path: derive_temp_path(&output),
            target_path: output,
            owner,
            payload,
            options,
            request,
        })
    }

    async fn source_artifact(&self, source: &TrackedSource) -> Result<Artifact, DispatchError> {
        let owner = self
            .store
            .resolve_owner(&source.owner)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Source owner {} not found", source.owner))?;
        let filename = source
            .filename()
            .ok_or_else(|| anyhow::anyhow!("Source {} has no file name", source.id))?;
        let artifact = self
            .store
            .find_artifact(&owner, filename)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Source {} not found", source.id))?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_local_origins() {
        assert!(is_local_origin(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(is_local_origin(IpAddr::V4(Ipv4Addr::new(127, 8, 0, 1))));
        assert!(is_local_origin(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_local_origin(IpAddr::V6(
            Ipv4Addr::LOCALHOST.to_ipv6_mapped()
        )));
    }

    #[test]
    fn test_public_origins() {
        assert!(!is_local_origin(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))));
        assert!(!is_local_origin(IpAddr::V4(Ipv4Addr::UNSPECIFIED)));
        assert!(!is_local_origin(IpAddr::V6(
            Ipv4Addr::new(198, 51, 100, 1).to_ipv6_mapped()
        )));
    }
}
