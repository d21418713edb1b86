//! Filesystem-backed artifact store

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument};

use super::{Artifact, ArtifactReader, ArtifactStore, Grant, Owner, OwnerRef};

/// Artifact store rooted at a directory.
///
/// Owner `blog/post` maps to `{root}/blog/post/`, and its artifact `a.pdf`
/// to `{root}/blog/post/a.pdf`, published at `{public_url}/blog/post/a.pdf`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    public_url: String,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the owner directory if needed and return it resolved
    pub async fn ensure_owner(&self, owner: &OwnerRef) -> Result<Owner> {
        let dir = self
            .owner_dir(owner)
            .ok_or_else(|| anyhow!("Invalid owner id: {}", owner))?;
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create owner directory {}", dir.display()))?;
        Ok(Owner {
            id: owner.clone(),
            root: dir,
        })
    }

    fn owner_dir(&self, owner: &OwnerRef) -> Option<PathBuf> {
        let id = owner.as_str().trim_matches('/');
        if id.is_empty() {
            return None;
        }
        let relative = Path::new(id);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.root.join(relative))
    }

    fn ensure_contained(&self, path: &Path) -> Result<()> {
        if !self.contains(path) {
            bail!("Path {} is outside the artifact store", path.display());
        }
        Ok(())
    }

    async fn load_artifact(&self, owner: &Owner, filename: &str, path: PathBuf) -> Result<Artifact> {
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let modified = metadata
            .modified()
            .map(|t| DateTime::<Utc>::from(t).timestamp())
            .unwrap_or(0);

        Ok(Artifact {
            id: format!("{}/{}", owner.id, filename),
            owner: owner.id.clone(),
            filename: filename.to_string(),
            url: format!("{}/{}/{}", self.public_url, owner.id, filename),
            path,
            modified,
            size: metadata.len(),
        })
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => bail!("Invalid artifact filename: '{}'", filename),
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn contains(&self, path: &Path) -> bool {
        match path.strip_prefix(&self.root) {
            Ok(relative) => {
                !relative.as_os_str().is_empty()
                    && relative
                        .components()
                        .all(|c| matches!(c, Component::Normal(_)))
            },
            Err(_) => false,
        }
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.ensure_contained(path)?;
        Ok(tokio::fs::try_exists(path).await.unwrap_or(false))
    }

    #[instrument(skip(self))]
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.ensure_contained(path)?;
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.ensure_contained(path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(path, data)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, path: &Path) -> Result<()> {
        self.ensure_contained(path)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    async fn resolve_owner(&self, owner: &OwnerRef) -> Result<Option<Owner>> {
        let Some(dir) = self.owner_dir(owner) else {
            return Ok(None);
        };
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(Some(Owner {
                id: owner.clone(),
                root: dir,
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to resolve owner {}", owner)),
        }
    }

    async fn find_artifact(&self, owner: &Owner, filename: &str) -> Result<Option<Artifact>> {
        if validate_filename(filename).is_err() {
            return Ok(None);
        }
        let path = owner.root.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(self.load_artifact(owner, filename, path).await?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to look up {}", path.display())),
        }
    }

    #[instrument(skip(self, grant), fields(principal = %grant.principal(), owner = %owner.id))]
    async fn create_artifact(
        &self,
        grant: &Grant<'_>,
        owner: &Owner,
        filename: &str,
        source: &Path,
    ) -> Result<Artifact> {
        validate_filename(filename)?;
        self.ensure_contained(source)?;
        let dest = owner.root.join(filename);

        if source != dest {
            // Rename is atomic within a filesystem; fall back to copy + rename
            // through a sibling partial file when the source lives elsewhere.
            if let Err(e) = tokio::fs::rename(source, &dest).await {
                debug!(error = %e, "Rename failed, copying {}", source.display());
                let partial = owner.root.join(format!(".{}.partial", filename));
                tokio::fs::copy(source, &partial)
                    .await
                    .with_context(|| format!("Failed to copy {}", source.display()))?;
                tokio::fs::rename(&partial, &dest)
                    .await
                    .with_context(|| format!("Failed to install {}", dest.display()))?;
            }
        }

        let artifact = self.load_artifact(owner, filename, dest).await?;
        info!(artifact = %artifact.id, size = artifact.size, "Artifact created");
        Ok(artifact)
    }

    async fn open_for_read(&self, artifact: &Artifact) -> Result<ArtifactReader> {
        let file = tokio::fs::File::open(&artifact.path)
            .await
            .with_context(|| format!("Failed to open {}", artifact.path.display()))?;
        Ok(Box::new(file))
    }
}
