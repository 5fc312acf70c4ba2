//! Call resilience - backoff, classification, retry, and the pipeline.
//!
//! Leaves first: [`backoff`] is the pure reconnect policy, [`classifier`]
//! maps raw connector errors to the retry/fatal taxonomy, [`retry`] is the
//! generic bounded-retry driver, and [`pipeline`] composes them around each
//! remote call.

pub mod backoff;
pub mod classifier;
pub mod pipeline;
pub mod retry;

pub use backoff::{CloseCode, ReconnectSchedule};
pub use classifier::{ClassifiedError, ErrorKind, classify};
pub use pipeline::CallPipeline;
pub use retry::{CallOutcome, RetryPolicy, run_with_retry};
