//! Shared fixtures for integration tests
//!
//! The remote service is replaced by [`FakeClient`], and the cache backend by
//! [`RecordingCacheStore`]. Both append to one [`EventLog`], so tests can
//! assert on the order of cache writes relative to remote calls.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use convoy_server::cache::{CacheError, CacheStore, FingerprintCache, MemoryCacheStore};
use convoy_server::config::{Config, ConversionConfig};
use convoy_server::conversion::{CallbackResolver, Credential, JobDispatcher, Materializer};
use convoy_server::remote::{
    CallbackFetcher, ClientFactory, ConversionClient, JobMode, JobOptions, JobStatus, OutputRef,
    RemoteError, RemoteJob, UrlRef,
};
use convoy_server::storage::{
    Artifact, ArtifactReader, ArtifactStore, LocalArtifactStore, OwnerRef, ServiceAccount,
};

pub const PUBLIC_ORIGIN: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));
pub const LOCAL_ORIGIN: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const JOB_ID: &str = "job-1";

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn clear(log: &EventLog) {
    log.lock().unwrap().clear();
}

fn record(log: &EventLog, event: impl Into<String>) {
    log.lock().unwrap().push(event.into());
}

/// Memory cache that logs every write
pub struct RecordingCacheStore {
    inner: MemoryCacheStore,
    log: EventLog,
}

impl RecordingCacheStore {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: MemoryCacheStore::new(),
            log,
        }
    }
}

#[async_trait]
impl CacheStore for RecordingCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        record(&self.log, format!("cache.set:{}", key));
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        record(&self.log, format!("cache.remove:{}", key));
        self.inner.remove(key).await
    }
}

/// Scripted stand-in for the remote service
pub struct FakeClient {
    log: EventLog,
    output: Vec<u8>,
    fail_wait: bool,
    pub uploaded: Mutex<Option<(String, Vec<u8>)>>,
    pub started_with: Mutex<Option<JobOptions>>,
}

impl FakeClient {
    fn status(&self, step: &str) -> JobStatus {
        JobStatus {
            id: Some(JOB_ID.to_string()),
            url: Some(format!("//remote.test/process/{}", JOB_ID)),
            step: Some(step.to_string()),
            ..Default::default()
        }
    }

    pub fn started_option(&self, key: &str) -> Option<serde_json::Value> {
        self.started_with
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|options| options.get(key).cloned())
    }
}

#[async_trait]
impl ConversionClient for FakeClient {
    async fn create_job(
        &self,
        format_in: &str,
        format_out: &str,
        mode: JobMode,
    ) -> Result<RemoteJob, RemoteError> {
        record(
            &self.log,
            format!("client.create_job:{}->{}:{}", format_in, format_out, mode.as_str()),
        );
        RemoteJob::from_status(self.status("input"))
    }

    async fn start(&self, job: &RemoteJob, options: &JobOptions) -> Result<RemoteJob, RemoteError> {
        record(&self.log, "client.start");
        *self.started_with.lock().unwrap() = Some(options.clone());
        let mut status = self.status("input");
        status.upload = Some(UrlRef {
            url: Some(format!("//remote.test/upload/{}", JOB_ID)),
        });
        Ok(job.with_status(status))
    }

    async fn upload(
        &self,
        _job: &RemoteJob,
        filename: &str,
        mut reader: ArtifactReader,
    ) -> Result<(), RemoteError> {
        record(&self.log, format!("client.upload:{}", filename));
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        *self.uploaded.lock().unwrap() = Some((filename.to_string(), bytes));
        Ok(())
    }

    async fn wait(&self, job: &RemoteJob) -> Result<RemoteJob, RemoteError> {
        record(&self.log, "client.wait");
        if self.fail_wait {
            return Err(RemoteError::JobFailed {
                job_id: job.id.clone(),
                message: "conversion crashed".to_string(),
            });
        }
        let mut status = self.status("finished");
        status.output = Some(OutputRef {
            url: Some(format!("//remote.test/download/{}", JOB_ID)),
            filename: None,
        });
        Ok(job.with_status(status))
    }

    async fn download(&self, _job: &RemoteJob, dest: &Path) -> Result<(), RemoteError> {
        record(&self.log, "client.download");
        tokio::fs::write(dest, &self.output).await?;
        Ok(())
    }
}

pub struct FakeFactory {
    client: Arc<FakeClient>,
    fail: bool,
    pub builds: AtomicUsize,
}

impl ClientFactory for FakeFactory {
    fn build(&self, _api_key: &str) -> Result<Arc<dyn ConversionClient>, RemoteError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RemoteError::InvalidResponse("client unavailable".to_string()));
        }
        Ok(self.client.clone())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<LocalArtifactStore>,
    pub log: EventLog,
    pub cache: FingerprintCache,
    pub client: Arc<FakeClient>,
    pub factory: Arc<FakeFactory>,
    pub materializer: Arc<Materializer>,
    pub dispatcher: Arc<JobDispatcher>,
}

pub struct HarnessBuilder {
    config: ConversionConfig,
    credential: Credential,
    output: Vec<u8>,
    fail_wait: bool,
    factory_fails: bool,
}

impl HarnessBuilder {
    pub fn default_async(mut self, value: bool) -> Self {
        self.config.default_async = value;
        self
    }

    pub fn strategy(mut self, name: &str) -> Self {
        self.config.strategy = name.to_string();
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn output(mut self, bytes: &[u8]) -> Self {
        self.output = bytes.to_vec();
        self
    }

    pub fn fail_wait(mut self) -> Self {
        self.fail_wait = true;
        self
    }

    pub fn factory_fails(mut self) -> Self {
        self.factory_fails = true;
        self
    }

    pub fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalArtifactStore::new(dir.path(), "http://media.test"));
        let log: EventLog = Arc::default();
        let cache = FingerprintCache::new(Arc::new(RecordingCacheStore::new(log.clone())));

        let client = Arc::new(FakeClient {
            log: log.clone(),
            output: self.output,
            fail_wait: self.fail_wait,
            uploaded: Mutex::new(None),
            started_with: Mutex::new(None),
        });
        let factory = Arc::new(FakeFactory {
            client: client.clone(),
            fail: self.factory_fails,
            builds: AtomicUsize::new(0),
        });
        let materializer = Arc::new(Materializer::new(
            store.clone(),
            ServiceAccount::new("convoy-test"),
        ));
        let dispatcher = Arc::new(JobDispatcher::new(
            &self.config,
            self.credential,
            factory.clone(),
            cache.clone(),
            materializer.clone(),
        ));

        Harness {
            dir,
            store,
            log,
            cache,
            client,
            factory,
            materializer,
            dispatcher,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: Config::default().conversion,
            credential: Credential::Static("test-key".to_string()),
            output: b"%PDF-1.7 converted".to_vec(),
            fail_wait: false,
            factory_fails: false,
        }
    }

    /// Store a source artifact under `owner`
    pub async fn source(&self, owner: &str, filename: &str, bytes: &[u8]) -> Artifact {
        let owner = self.store.ensure_owner(&OwnerRef::new(owner)).await.unwrap();
        self.store.write(&owner.root.join(filename), bytes).await.unwrap();
        self.store.find_artifact(&owner, filename).await.unwrap().unwrap()
    }

    pub fn owner_root(&self, owner: &str) -> PathBuf {
        self.dir.path().join(owner)
    }

    pub fn resolver(&self, fetcher: Arc<dyn CallbackFetcher>) -> CallbackResolver {
        CallbackResolver::new(self.cache.clone(), fetcher, self.materializer.clone())
    }

    /// Every file under the store root, relative to it
    pub fn stored_files(&self) -> Vec<PathBuf> {
        fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path, root, out);
                } else {
                    out.push(path.strip_prefix(root).unwrap().to_path_buf());
                }
            }
        }
        let mut files = Vec::new();
        walk(self.dir.path(), self.dir.path(), &mut files);
        files.sort();
        files
    }

    pub fn client_calls(&self) -> Vec<String> {
        events(&self.log)
            .into_iter()
            .filter(|e| e.starts_with("client."))
            .collect()
    }

    pub fn cache_writes(&self) -> Vec<String> {
        events(&self.log)
            .into_iter()
            .filter(|e| e.starts_with("cache.set:"))
            .collect()
    }
}
