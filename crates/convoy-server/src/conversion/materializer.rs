//! Installs finished conversions as artifacts

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, instrument, warn};

use crate::storage::{Artifact, ArtifactStore, OwnerRef, ServiceAccount};

/// Removes a staged file when dropped
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "Temp file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove temp file"),
        }
    }
}

pub struct Materializer {
    store: Arc<dyn ArtifactStore>,
    account: ServiceAccount,
}

impl Materializer {
    pub fn new(store: Arc<dyn ArtifactStore>, account: ServiceAccount) -> Self {
        Self { store, account }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn service_account(&self) -> &ServiceAccount {
        &self.account
    }

    /// Install the file at `temp_path` as artifact `basename(output_path)` of `owner`.
    ///
    /// `temp_path` never survives this call, whatever the outcome.
    #[instrument(skip(self), fields(temp = %temp_path.display(), output = %output_path.display()))]
    pub async fn materialize(
        &self,
        owner: &OwnerRef,
        temp_path: &Path,
        output_path: &Path,
    ) -> Option<Artifact> {
        let _cleanup = TempFileGuard::new(temp_path);

        let owner = match self.store.resolve_owner(owner).await {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                warn!(owner = %owner, "Owner not found, dropping conversion output");
                return None;
            }
            Err(e) => {
                warn!(owner = %owner, error = %e, "Failed to resolve owner");
                return None;
            }
        };

        let Some(filename) = output_path.file_name().and_then(|name| name.to_str()) else {
            warn!("Output path has no usable file name");
            return None;
        };

        let result = {
            let grant = self.account.acquire();
            self.store
                .create_artifact(&grant, &owner, filename, temp_path)
                .await
        };

        match result {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                error!(error = %e, "Failed to create artifact");
                None
            }
        }
    }
}
