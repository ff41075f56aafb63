//! The sink abstraction and its in-process implementations.

use async_trait::async_trait;
use convertly_types::{Event, EventDetails, EventKind};

/// A fire-and-forget destination for telemetry events.
///
/// The single operation, [`emit`](EventSink::emit), stamps the producer's
/// identity and the current time onto the event and hands it off. It returns
/// nothing: a sink that cannot deliver drops the event after a bounded
/// best-effort attempt, and the caller's business logic is unaffected.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emit one event. Never fails, never blocks indefinitely.
    async fn emit(&self, kind: EventKind, details: EventDetails);
}

/// A sink that discards every event.
///
/// Useful for services running without a broker (local development, tests
/// that don't care about telemetry).
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl NoopSink {
    /// Create a new no-op sink.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSink for NoopSink {
    async fn emit(&self, _kind: EventKind, _details: EventDetails) {}
}

/// A sink that forwards stamped events over a tokio channel.
///
/// This is the test double: it goes through the same stamping path as the
/// real sink but delivers in-process. Sends are best-effort; if the receiver
/// lags or is gone the event is dropped, matching broker semantics.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    service: String,
    tx: tokio::sync::mpsc::Sender<Event>,
}

impl ChannelSink {
    /// Create a sink and the receiver observing its events.
    pub fn create(
        service: impl Into<String>,
        buffer: usize,
    ) -> (Self, tokio::sync::mpsc::Receiver<Event>) {
        let (tx, rx) = tokio::sync::mpsc::channel(buffer);
        (
            Self {
                service: service.into(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, kind: EventKind, details: EventDetails) {
        let event = Event::now(self.service.clone(), kind, details);
        let _ = self.tx.try_send(event);
    }
}
