//! reqwest-backed remote client
//!
//! Speaks the process-based JSON API: a job is created with `POST /process`,
//! after which every call goes to the (protocol-relative) URLs the service
//! hands back.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Body, Client, Response};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};

use super::{
    resolve_url, CallbackFetcher, ClientFactory, ConversionClient, JobMode, JobOptions, JobStatus,
    RemoteError, RemoteJob,
};
use crate::storage::ArtifactReader;

// ============================================================================
// HTTP Client Constants
// ============================================================================

/// Path of the job creation endpoint, relative to the API base URL.
pub const PROCESS_ENDPOINT: &str = "/process";

/// Scheme used for protocol-relative URLs when the base URL has none.
pub const FALLBACK_SCHEME: &str = "https";

fn build_http(timeout: Duration) -> Result<Client, RemoteError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn scheme_of(url: &str) -> &str {
    match url.split_once("://") {
        Some((scheme, _)) if scheme == "http" || scheme == "https" => scheme,
        _ => FALLBACK_SCHEME,
    }
}

async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

fn fail_on_error_step(job_id: &str, status: &JobStatus) -> Result<(), RemoteError> {
    if status.is_error() {
        return Err(RemoteError::JobFailed {
            job_id: job_id.to_string(),
            message: status
                .message
                .clone()
                .unwrap_or_else(|| "conversion failed".to_string()),
        });
    }
    Ok(())
}

/// Authenticated client for one API key
pub struct HttpConversionClient {
    http: Client,
    api_url: String,
    api_key: String,
    scheme: String,
    poll_interval: Duration,
}

impl std::fmt::Debug for HttpConversionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConversionClient")
            .field("api_url", &self.api_url)
            .field("scheme", &self.scheme)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl HttpConversionClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, RemoteError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let scheme = scheme_of(&api_url).to_string();
        Ok(Self {
            http: build_http(timeout)?,
            api_url,
            api_key: api_key.into(),
            scheme,
            poll_interval,
        })
    }

    fn resolve(&self, url: &str) -> Result<String, RemoteError> {
        resolve_url(&self.scheme, url)
    }

    async fn get_status(&self, url: &str, wait: bool) -> Result<JobStatus, RemoteError> {
        let mut request = self.http.get(url);
        if wait {
            request = request.query(&[("wait", "true")]);
        }
        let response = ensure_success(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ConversionClient for HttpConversionClient {
    #[instrument(skip(self))]
    async fn create_job(
        &self,
        format_in: &str,
        format_out: &str,
        mode: JobMode,
    ) -> Result<RemoteJob, RemoteError> {
        let url = format!("{}{}", self.api_url, PROCESS_ENDPOINT);
        let body = serde_json::json!({
            "apikey": self.api_key,
            "inputformat": format_in,
            "outputformat": format_out,
            "mode": mode.as_str(),
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status: JobStatus = ensure_success(response).await?.json().await?;
        let job = RemoteJob::from_status(status)?;

        debug!(job_id = %job.id, "Remote job created");
        Ok(job)
    }

    #[instrument(skip(self, job, options), fields(job_id = %job.id))]
    async fn start(&self, job: &RemoteJob, options: &JobOptions) -> Result<RemoteJob, RemoteError> {
        let url = self.resolve(&job.url)?;
        let response = self.http.post(&url).json(options).send().await?;
        let status: JobStatus = ensure_success(response).await?.json().await?;
        fail_on_error_step(&job.id, &status)?;

        debug!(step = ?status.step, "Remote job started");
        Ok(job.with_status(status))
    }

    #[instrument(skip(self, job, reader), fields(job_id = %job.id))]
    async fn upload(
        &self,
        job: &RemoteJob,
        filename: &str,
        reader: ArtifactReader,
    ) -> Result<(), RemoteError> {
        let upload_url = job.status.upload_url().ok_or_else(|| {
            RemoteError::InvalidResponse(format!("job {} has no upload url", job.id))
        })?;
        let url = format!(
            "{}/{}",
            self.resolve(upload_url)?.trim_end_matches('/'),
            urlencoding::encode(filename)
        );

        let body = Body::wrap_stream(ReaderStream::new(reader));
        let response = self.http.put(&url).body(body).send().await?;
        ensure_success(response).await?;

        debug!("Source uploaded");
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn wait(&self, job: &RemoteJob) -> Result<RemoteJob, RemoteError> {
        let url = self.resolve(&job.url)?;
        loop {
            let status = self.get_status(&url, true).await?;
            fail_on_error_step(&job.id, &status)?;
            if status.is_finished() {
                debug!("Remote job finished");
                return Ok(job.with_status(status));
            }
            debug!(step = ?status.step, "Remote job still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, dest = %dest.display()))]
    async fn download(&self, job: &RemoteJob, dest: &Path) -> Result<(), RemoteError> {
        let output_url = job.status.output_url().ok_or_else(|| {
            RemoteError::InvalidResponse(format!("job {} has no output url", job.id))
        })?;
        let url = self.resolve(output_url)?;

        let response = ensure_success(self.http.get(&url).send().await?).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(bytes = written, "Output downloaded");
        Ok(())
    }
}

/// Builds [`HttpConversionClient`]s sharing one configuration
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    api_url: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl HttpClientFactory {
    pub fn new(api_url: impl Into<String>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            api_url: api_url.into(),
            timeout,
            poll_interval,
        }
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(&self, api_key: &str) -> Result<Arc<dyn ConversionClient>, RemoteError> {
        let client =
            HttpConversionClient::new(&self.api_url, api_key, self.timeout, self.poll_interval)?;
        Ok(Arc::new(client))
    }
}

/// Unauthenticated fetcher for callback-supplied URLs
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    scheme: String,
}

impl HttpFetcher {
    pub fn new(scheme: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        Ok(Self {
            http: build_http(timeout)?,
            scheme: scheme.into(),
        })
    }
}

#[async_trait]
impl CallbackFetcher for HttpFetcher {
    async fn fetch_status(&self, url: &str) -> Result<JobStatus, RemoteError> {
        let url = resolve_url(&self.scheme, url)?;
        let response = ensure_success(self.http.get(&url).send().await?).await?;
        response.json().await.map_err(|e| {
            warn!(url = %url, error = %e, "Status document is not valid JSON");
            RemoteError::from(e)
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let url = resolve_url(&self.scheme, url)?;
        let response = ensure_success(self.http.get(&url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
