//! Error types for telemetry sinks.

use thiserror::Error;

/// Errors that can occur while publishing a telemetry event.
///
/// These never reach producing business logic: [`crate::EventSink::emit`]
/// absorbs them after a best-effort attempt. They exist so the internal
/// publish path can use `?` and so tests can assert on failure modes.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Broker connection, channel, or publish failure.
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// The event could not be serialized to JSON.
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The publish attempt did not complete within the configured timeout.
    #[error("publish timed out")]
    Timeout,
}
