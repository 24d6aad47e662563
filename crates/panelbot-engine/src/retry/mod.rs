//! Retry and backoff around provider calls.
//!
//! `classify` decides whether a failure is worth another attempt, `policy`
//! holds the immutable per-call-site configuration, and `run` drives the
//! attempt loop including response normalization.

mod classify;
mod policy;
mod run;

pub use classify::{FailureClassifier, RetryClass, DEFAULT_RETRYABLE_STATUSES, DEFAULT_TRANSIENT_HINTS};
pub use policy::RetryPolicy;
pub use run::{outputs_match, RetryController, Sleeper, ThreadSleeper};
