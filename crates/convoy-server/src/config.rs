//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::conversion::request::InputMode;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Conversion Configuration Constants
// ============================================================================

/// Default base URL of the remote conversion API.
pub const DEFAULT_API_URL: &str = "https://api.cloudconvert.com";

/// Route the remote service calls back when an async job finishes.
pub const DEFAULT_CALLBACK_PATH: &str = "/plugin-cloudconvert";

/// Scheme prepended to protocol-relative URLs handed to the callback.
pub const DEFAULT_CALLBACK_SCHEME: &str = "http";

/// Public base URL of this server, used to build the callback URL.
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8000";

/// Per-request HTTP timeout towards the remote service, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Delay between status polls while waiting on a synchronous job.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Strategy name selecting sync or async by execution mode.
pub const DEFAULT_STRATEGY: &str = "auto";

// ============================================================================
// Cache / Storage Configuration Constants
// ============================================================================

/// Default location of the fingerprint cache database.
pub const DEFAULT_CACHE_PATH: &str = "./data/convoy-cache.db";

/// Default artifact store root.
pub const DEFAULT_STORAGE_ROOT: &str = "./data/artifacts";

/// Default public URL prefix for stored artifacts.
///
/// This server does not serve the storage root. In download input mode the
/// remote service fetches sources from here, so something else (a reverse
/// proxy or static file server) must expose the root under this URL, or
/// `CONVOY_INPUT` must be set to `upload`.
pub const DEFAULT_STORAGE_PUBLIC_URL: &str = "http://localhost:8000/media";

/// Principal recorded for artifacts created by the materializer.
pub const DEFAULT_SERVICE_ACCOUNT: &str = "convoy";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub conversion: ConversionConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Remote conversion configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    pub api_url: String,
    /// Static credential
    pub api_key: Option<String>,
    /// Credential provider: the file is re-read on every dispatch
    pub api_key_file: Option<PathBuf>,
    pub default_async: bool,
    /// Strategy name, parsed at dispatch time (`auto` or `blocking`)
    pub strategy: String,
    pub input: InputMode,
    pub public_url: String,
    pub callback_path: String,
    pub callback_scheme: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub forget_completed_jobs: bool,
}

impl std::fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_file", &self.api_key_file)
            .field("default_async", &self.default_async)
            .field("strategy", &self.strategy)
            .field("input", &self.input)
            .field("public_url", &self.public_url)
            .field("callback_path", &self.callback_path)
            .field("callback_scheme", &self.callback_scheme)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("forget_completed_jobs", &self.forget_completed_jobs)
            .finish()
    }
}

impl ConversionConfig {
    /// Absolute URL the remote service should call back
    pub fn callback_url(&self) -> String {
        format!(
            "{}/{}",
            self.public_url.trim_end_matches('/'),
            self.callback_path.trim_start_matches('/')
        )
    }
}

/// Fingerprint cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When disabled, the cache lives in memory and is lost on restart
    pub enabled: bool,
    pub path: PathBuf,
}

/// Local artifact store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub public_url: String,
    pub service_account: String,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Read the environment without touching `.env` files or validating
    pub fn from_env() -> anyhow::Result<Self> {
        let input = match env_non_empty("CONVOY_INPUT") {
            Some(raw) => raw.parse()?,
            None => InputMode::Download,
        };

        Ok(Config {
            server: ServerConfig {
                host: env_or("CONVOY_HOST", DEFAULT_SERVER_HOST),
                port: env_parse("CONVOY_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse(
                    "CONVOY_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            conversion: ConversionConfig {
                api_url: env_or("CONVOY_API_URL", DEFAULT_API_URL),
                api_key: env_non_empty("CONVOY_API_KEY"),
                api_key_file: env_non_empty("CONVOY_API_KEY_FILE").map(PathBuf::from),
                default_async: env_parse("CONVOY_ASYNC", true),
                strategy: env_or("CONVOY_STRATEGY", DEFAULT_STRATEGY),
                input,
                public_url: env_or("CONVOY_PUBLIC_URL", DEFAULT_PUBLIC_URL),
                callback_path: env_or("CONVOY_CALLBACK_PATH", DEFAULT_CALLBACK_PATH),
                callback_scheme: env_or("CONVOY_CALLBACK_SCHEME", DEFAULT_CALLBACK_SCHEME),
                request_timeout_secs: env_parse(
                    "CONVOY_REQUEST_TIMEOUT",
                    DEFAULT_REQUEST_TIMEOUT_SECS,
                ),
                poll_interval_ms: env_parse("CONVOY_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
                forget_completed_jobs: env_parse("CONVOY_FORGET_COMPLETED_JOBS", false),
            },
            cache: CacheConfig {
                enabled: env_parse("CONVOY_CACHE_ENABLED", true),
                path: PathBuf::from(env_or("CONVOY_CACHE_PATH", DEFAULT_CACHE_PATH)),
            },
            storage: StorageConfig {
                root: PathBuf::from(env_or("CONVOY_STORAGE_ROOT", DEFAULT_STORAGE_ROOT)),
                public_url: env_or("CONVOY_STORAGE_PUBLIC_URL", DEFAULT_STORAGE_PUBLIC_URL),
                service_account: env_or("CONVOY_SERVICE_ACCOUNT", DEFAULT_SERVICE_ACCOUNT),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.conversion.api_url.trim().is_empty() {
            anyhow::bail!("Conversion API URL cannot be empty");
        }

        if !self.conversion.callback_path.starts_with('/') {
            anyhow::bail!(
                "Callback path must start with '/', got '{}'",
                self.conversion.callback_path
            );
        }

        if !matches!(self.conversion.callback_scheme.as_str(), "http" | "https") {
            anyhow::bail!(
                "Callback scheme must be http or https, got '{}'",
                self.conversion.callback_scheme
            );
        }

        if self.conversion.poll_interval_ms == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        // A missing credential is not fatal: dispatch logs and returns nothing
        if self.conversion.api_key.is_none() && self.conversion.api_key_file.is_none() {
            tracing::warn!("No conversion API key configured - conversions will be skipped");
        }

        if self.downloads_from_default_media_url() {
            tracing::warn!(
                "Download input mode with the default storage URL {} - the remote service \
                 can only fetch sources if it is served externally; set CONVOY_STORAGE_PUBLIC_URL \
                 or CONVOY_INPUT=upload",
                DEFAULT_STORAGE_PUBLIC_URL
            );
        }

        Ok(())
    }

    /// Whether the remote service is told to fetch sources from the default
    /// storage URL, which nothing in this process serves
    pub fn downloads_from_default_media_url(&self) -> bool {
        self.conversion.input == InputMode::Download
            && self.storage.public_url == DEFAULT_STORAGE_PUBLIC_URL
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            conversion: ConversionConfig {
                api_url: DEFAULT_API_URL.to_string(),
                api_key: None,
                api_key_file: None,
                default_async: true,
                strategy: DEFAULT_STRATEGY.to_string(),
                input: InputMode::Download,
                public_url: DEFAULT_PUBLIC_URL.to_string(),
                callback_path: DEFAULT_CALLBACK_PATH.to_string(),
                callback_scheme: DEFAULT_CALLBACK_SCHEME.to_string(),
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
                forget_completed_jobs: false,
            },
            cache: CacheConfig {
                enabled: true,
                path: PathBuf::from(DEFAULT_CACHE_PATH),
            },
            storage: StorageConfig {
                root: PathBuf::from(DEFAULT_STORAGE_ROOT),
                public_url: DEFAULT_STORAGE_PUBLIC_URL.to_string(),
                service_account: DEFAULT_SERVICE_ACCOUNT.to_string(),
            },
        }
    }
}
