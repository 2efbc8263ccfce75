//! Alert Delivery
//!
//! Posts alerts to an Alertmanager-compatible `/api/v2/alerts` endpoint.
//! Each batch is attempted a bounded number of times; only failures that
//! can plausibly clear on their own (timeouts, connection drops, 429, 5xx)
//! are retried. Caller cancellation stops delivery immediately, including
//! during a backoff sleep.

mod classify;
mod client;
mod context;
mod error;
mod retry;

pub use classify::{classify_cause, classify_transport, FailureKind};
pub use client::{AlertClient, ClientConfig, UpstreamAuth, ALERTS_PATH, DEFAULT_TIMEOUT, READY_PATH};
pub use context::{CallContext, CancelReason};
pub use error::{DeliveryError, MAX_ERROR_BODY_BYTES};
pub use retry::RetryPolicy;
