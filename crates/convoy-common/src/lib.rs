//! Convoy Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the Convoy workspace.
//!
//! # Overview
//!
//! - **Hashing**: md5 fingerprints used for cache keys and staging file names
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use convoy_common::hash::fingerprint;
//!
//! let key = fingerprint(&["pages/report/report.docx", "/srv/pages/report/report.pdf"]);
//! assert_eq!(key.len(), 32);
//! ```

pub mod hash;
pub mod logging;
