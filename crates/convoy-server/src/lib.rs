//! Convoy Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Conversion orchestration in front of a remote, possibly slow conversion
//! service.
//!
//! # Overview
//!
//! - **Conversion core** ([`conversion`]): staleness checks, sync and async
//!   dispatch, callback resolution and artifact materialization
//! - **Fingerprint cache** ([`cache`]): source markers and pending jobs, in
//!   SQLite or in memory
//! - **Remote client** ([`remote`]): the conversion service's HTTP API
//! - **Storage** ([`storage`]): a directory-backed artifact store
//! - **HTTP surface** ([`features`]): trigger and callback endpoints
//! - **Configuration** ([`config`]): environment-based, with defaults
//!
//! # Flow
//!
//! A conversion request is either answered from the cache (the source has not
//! changed and the output exists), run to completion while the caller waits,
//! or submitted with a callback URL. In the last case the job context is kept
//! in the fingerprint cache until the remote service calls back, at which
//! point the output is fetched and installed next to its source.
//!
//! # Example
//!
//! ```no_run
//! use convoy_server::cache::FingerprintCache;
//! use convoy_server::config::Config;
//! use convoy_server::conversion::{Credential, JobDispatcher, Materializer};
//! use convoy_server::remote::HttpClientFactory;
//! use convoy_server::storage::{LocalArtifactStore, ServiceAccount};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = Config::load()?;
//! let store = Arc::new(LocalArtifactStore::new(&config.storage.root, &config.storage.public_url));
//! let materializer = Arc::new(Materializer::new(store, ServiceAccount::new("convoy")));
//! let factory = Arc::new(HttpClientFactory::new(
//!     &config.conversion.api_url,
//!     Duration::from_secs(config.conversion.request_timeout_secs),
//!     Duration::from_millis(config.conversion.poll_interval_ms),
//! ));
//! let dispatcher = JobDispatcher::new(
//!     &config.conversion,
//!     Credential::from_config(&config.conversion),
//!     factory,
//!     FingerprintCache::in_memory(),
//!     materializer,
//! );
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod conversion;
pub mod error;
pub mod features;
pub mod middleware;
pub mod remote;
pub mod storage;

// Re-export commonly used types
pub use error::ApiError;
