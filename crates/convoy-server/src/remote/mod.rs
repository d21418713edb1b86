//! Remote conversion service
//!
//! The core talks to the conversion service through two seams:
//!
//! - [`ConversionClient`]: authenticated job lifecycle (create, start,
//!   upload, wait, download), built per dispatch by a [`ClientFactory`]
//!   from the configured credential.
//! - [`CallbackFetcher`]: unauthenticated reads of the status and output
//!   URLs handed to the callback endpoint.
//!
//! URLs coming back from the service are usually protocol-relative
//! (`//host/process/ID`); [`resolve_url`] pins them to a scheme.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::storage::ArtifactReader;

pub use http::{HttpClientFactory, HttpConversionClient, HttpFetcher};

/// Options object passed through to the remote start call
pub type JobOptions = serde_json::Map<String, serde_json::Value>;

/// Errors talking to the remote service
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Remote job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Invalid response from remote service: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Job mode requested at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    Convert,
}

impl JobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JobMode::Convert => "convert",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRef {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Job status document returned by the service.
///
/// Every field is optional: callers treat absence as "not there yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub upload: Option<UrlRef>,
    #[serde(default)]
    pub output: Option<OutputRef>,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        self.step.as_deref() == Some("finished")
    }

    pub fn is_error(&self) -> bool {
        self.step.as_deref() == Some("error")
    }

    pub fn is_terminal(&self) -> bool {
        self.is_finished() || self.is_error()
    }

    pub fn output_url(&self) -> Option<&str> {
        self.output
            .as_ref()
            .and_then(|o| o.url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }

    pub fn upload_url(&self) -> Option<&str> {
        self.upload
            .as_ref()
            .and_then(|u| u.url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }
}

/// Handle on a remote job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    pub id: String,
    /// Status URL, as returned by the service
    pub url: String,
    /// Latest status seen for this job
    pub status: JobStatus,
}

impl RemoteJob {
    /// Build a handle from a status document, deriving the id from the
    /// last URL segment when the service omits it.
    pub fn from_status(status: JobStatus) -> Result<Self, RemoteError> {
        let url = status
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| RemoteError::InvalidResponse("job status has no url".to_string()))?;

        let id = status
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| {
                url.trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
            })
            .ok_or_else(|| RemoteError::InvalidResponse(format!("cannot derive job id from {}", url)))?;

        Ok(Self {
            id: id.trim().to_string(),
            url,
            status,
        })
    }

    /// Same job with a newer status; keeps id and url when the update omits them
    pub fn with_status(&self, status: JobStatus) -> Self {
        Self {
            id: self.id.clone(),
            url: status.url.clone().unwrap_or_else(|| self.url.clone()),
            status,
        }
    }
}

/// Authenticated job lifecycle against the remote service
#[async_trait]
pub trait ConversionClient: Send + Sync {
    async fn create_job(
        &self,
        format_in: &str,
        format_out: &str,
        mode: JobMode,
    ) -> Result<RemoteJob, RemoteError>;

    async fn start(&self, job: &RemoteJob, options: &JobOptions) -> Result<RemoteJob, RemoteError>;

    /// Stream the source bytes to a started upload-mode job
    async fn upload(
        &self,
        job: &RemoteJob,
        filename: &str,
        reader: ArtifactReader,
    ) -> Result<(), RemoteError>;

    /// Block until the job reaches a terminal step.
    ///
    /// No overall deadline: only the per-request HTTP timeout applies.
    async fn wait(&self, job: &RemoteJob) -> Result<RemoteJob, RemoteError>;

    async fn download(&self, job: &RemoteJob, dest: &Path) -> Result<(), RemoteError>;
}

/// Builds a client for a credential
pub trait ClientFactory: Send + Sync {
    fn build(&self, api_key: &str) -> Result<Arc<dyn ConversionClient>, RemoteError>;
}

/// Unauthenticated reads used by the callback path
#[async_trait]
pub trait CallbackFetcher: Send + Sync {
    async fn fetch_status(&self, url: &str) -> Result<JobStatus, RemoteError>;

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, RemoteError>;
}

/// Pin a protocol-relative URL to `scheme`; absolute http(s) URLs pass through
pub fn resolve_url(scheme: &str, url: &str) -> Result<String, RemoteError> {
    let url = url.trim();
    if url.starts_with("//") {
        Ok(format!("{}:{}", scheme, url))
    } else if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Err(RemoteError::InvalidUrl(url.to_string()))
    }
}
