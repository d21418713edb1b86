//! Artifact storage
//!
//! The conversion core only needs a handful of operations from storage: plain
//! path-level reads and writes for staging files, and owner-scoped artifact
//! lookup and creation for finished outputs. [`ArtifactStore`] captures exactly
//! that; [`LocalArtifactStore`] backs it with a directory tree where each owner
//! is a directory and each artifact a file inside it.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncRead;

pub mod local;

pub use local::LocalArtifactStore;

/// Byte stream over an artifact's content
pub type ArtifactReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Identity of the logical container an artifact is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerRef(pub String);

impl OwnerRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved, live owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: OwnerRef,
    pub root: PathBuf,
}

/// A stored artifact with tracked metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Stable identity: `{owner}/{filename}`
    pub id: String,
    pub owner: OwnerRef,
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
    /// Last modification, unix seconds
    pub modified: i64,
    pub size: u64,
}

impl Artifact {
    pub fn modified_marker(&self) -> i64 {
        self.modified
    }

    pub fn canonical_path(&self) -> &Path {
        &self.path
    }

    pub fn public_url(&self) -> &str {
        &self.url
    }
}

/// Principal the materializer acts as when installing artifacts.
///
/// Creating an artifact requires a live [`Grant`]. Grants are RAII guards:
/// the elevation ends when the guard drops, on every exit path.
#[derive(Debug)]
pub struct ServiceAccount {
    principal: String,
    active: AtomicUsize,
}

impl ServiceAccount {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            active: AtomicUsize::new(0),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn acquire(&self) -> Grant<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(principal = %self.principal, "Service account grant acquired");
        Grant { account: self }
    }

    /// Number of grants currently held
    pub fn active_grants(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Scoped elevation for a single store call
#[derive(Debug)]
pub struct Grant<'a> {
    account: &'a ServiceAccount,
}

impl Grant<'_> {
    pub fn principal(&self) -> &str {
        self.account.principal()
    }
}

impl Drop for Grant<'_> {
    fn drop(&mut self) {
        self.account.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(principal = %self.account.principal, "Service account grant released");
    }
}

/// Storage operations used by the conversion core
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Whether `path` lies inside the store. Path-level operations reject
    /// anything else.
    fn contains(&self, path: &Path) -> bool;

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write bytes, creating parent directories as needed
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Remove a path; removing a missing path is not an error
    async fn remove(&self, path: &Path) -> Result<()>;

    /// Resolve an owner reference to a live owner, `None` if it does not exist
    async fn resolve_owner(&self, owner: &OwnerRef) -> Result<Option<Owner>>;

    async fn find_artifact(&self, owner: &Owner, filename: &str) -> Result<Option<Artifact>>;

    /// Install `source` as artifact `filename` of `owner`.
    ///
    /// Replaces an existing artifact of the same name. `source` may be moved.
    async fn create_artifact(
        &self,
        grant: &Grant<'_>,
        owner: &Owner,
        filename: &str,
        source: &Path,
    ) -> Result<Artifact>;

    async fn open_for_read(&self, artifact: &Artifact) -> Result<ArtifactReader>;
}
