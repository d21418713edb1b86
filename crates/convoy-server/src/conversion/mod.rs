//! Conversion orchestration
//!
//! ```text
//! JobDispatcher::convert ──▶ staleness check ──▶ cached artifact
//!          │
//!          ├─ sync  ──▶ client: create/start/upload/wait/download ──▶ Materializer
//!          └─ async ──▶ client: create/start/upload ──▶ PendingJob in cache
//!
//! CallbackResolver::handle(job_id, status_url)
//!          └─ PendingJob ──▶ fetch status ──▶ fetch output ──▶ Materializer
//! ```

pub mod credential;
pub mod dispatcher;
pub mod materializer;
pub mod paths;
pub mod request;
pub mod resolver;
pub mod strategy;

pub use credential::Credential;
pub use dispatcher::{is_local_origin, DispatchError, JobDispatcher};
pub use materializer::Materializer;
pub use request::{
    ConversionRequest, DispatchOutcome, InputMode, JobResult, PendingJob, SourceRef,
    TrackedSource,
};
pub use resolver::CallbackResolver;
pub use strategy::{AsyncStrategy, ConversionStrategy, StrategyKind, SyncStrategy};
