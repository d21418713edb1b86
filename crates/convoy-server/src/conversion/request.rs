//! Conversion request model

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::remote::JobOptions;
use crate::storage::{Artifact, OwnerRef};

/// How the remote service receives the source bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Bytes are streamed to the service
    Upload,
    /// The service fetches the source from its public URL
    Download,
}

impl InputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InputMode::Upload => "upload",
            InputMode::Download => "download",
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown input mode '{0}', expected 'upload' or 'download'")]
pub struct UnknownInputMode(pub String);

impl FromStr for InputMode {
    type Err = UnknownInputMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(InputMode::Upload),
            "download" => Ok(InputMode::Download),
            _ => Err(UnknownInputMode(s.to_string())),
        }
    }
}

/// A source artifact with tracked identity and modification marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSource {
    pub id: String,
    /// Last modification, unix seconds
    pub marker: i64,
    pub owner: OwnerRef,
    pub path: PathBuf,
    pub url: String,
}

impl TrackedSource {
    pub fn filename(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

impl From<&Artifact> for TrackedSource {
    fn from(artifact: &Artifact) -> Self {
        Self {
            id: artifact.id.clone(),
            marker: artifact.modified_marker(),
            owner: artifact.owner.clone(),
            path: artifact.canonical_path().to_path_buf(),
            url: artifact.public_url().to_string(),
        }
    }
}

/// What is being converted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceRef {
    Trackable(TrackedSource),
    /// A bare path with no tracked metadata
    Opaque { path: PathBuf },
}

/// One conversion of a source into a target format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub source: SourceRef,
    pub input: InputMode,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    pub format_in: String,
    pub format_out: String,
    /// Container the finished artifact attaches to; defaults to the source's owner
    #[serde(default)]
    pub owner: Option<OwnerRef>,
    /// Passed through to the remote start call
    #[serde(default)]
    pub extra: JobOptions,
}

impl ConversionRequest {
    /// Request converting a tracked artifact, inferring the input format
    /// from its extension
    pub fn for_artifact(artifact: &Artifact, format_out: impl Into<String>, input: InputMode) -> Self {
        let format_in = Path::new(&artifact.filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self {
            source: SourceRef::Trackable(TrackedSource::from(artifact)),
            input,
            output_path: None,
            format_in,
            format_out: format_out.into(),
            owner: None,
            extra: JobOptions::new(),
        }
    }

    /// Owner the output attaches to
    pub fn effective_owner(&self) -> Option<&OwnerRef> {
        self.owner.as_ref().or(match &self.source {
            SourceRef::Trackable(source) => Some(&source.owner),
            SourceRef::Opaque { .. } => None,
        })
    }
}

/// Source bytes as the remote service will receive them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPayload {
    Upload(Artifact),
    Download { url: String },
}

/// A request with every path and option resolved, ready for a strategy
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub request: ConversionRequest,
    pub owner: OwnerRef,
    pub target_path: PathBuf,
    pub temp_path: PathBuf,
    pub payload: InputPayload,
    pub options: JobOptions,
}

/// Context persisted for an accepted async job, keyed by remote job id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingJob {
    pub job_id: String,
    pub request: ConversionRequest,
    pub target_path: PathBuf,
    pub temp_path: PathBuf,
}

/// Outcome of running a strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// Accepted remotely, completion arrives through the callback
    Pending { job_id: String },
    Completed { artifact: Artifact },
    Failed { reason: String },
}

/// Outcome of a dispatch that did not bail out early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Output is fresh and already stored; the remote service was not contacted
    Cached(Artifact),
    Dispatched(JobResult),
    /// Opaque source: only reports whether the output path exists
    Untracked { path: PathBuf, exists: bool },
}
