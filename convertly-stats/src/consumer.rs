//! The broker consumer: an infinite reconnect/consume loop.
//!
//! The loop is a three-state machine supervised by one tokio task:
//!
//! - **CONNECTING**: open a connection and channel, declare the durable
//!   fanout exchange (idempotent, so either the publisher or this side may
//!   create it first), declare a fresh server-named exclusive queue, bind it
//! - **CONSUMING**: drive the delivery stream; decode, apply, then ack each
//!   message exactly once after processing (at-least-once delivery)
//! - **BACKOFF**: sleep a fixed interval after any broker failure, then
//!   reconnect
//!
//! The exclusive queue is created per connection attempt, so events published
//! during an outage are lost; that is the accepted lossiness of this
//! pipeline, not a bug. The loop ends only when the shutdown signal flips.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use convertly_types::Event;

use crate::aggregator::Aggregator;

/// Broker settings for the consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// AMQP broker URL.
    pub amqp_url: String,
    /// Fanout exchange name, matching the publisher side.
    pub exchange: String,
    /// Fixed sleep between reconnect attempts.
    pub backoff: Duration,
}

/// Spawn the consumer loop on a background task.
///
/// The task runs until `stop` flips to `true`. Broker failures never
/// terminate it; they only trigger backoff and reconnect.
pub fn spawn(
    settings: ConsumerSettings,
    aggregator: Arc<Aggregator>,
    stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run(settings, aggregator, stop))
}

/// The supervised reconnect loop.
pub async fn run(
    settings: ConsumerSettings,
    aggregator: Arc<Aggregator>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            return;
        }

        match consume(&settings, &aggregator, &mut stop).await {
            // Clean exit: shutdown was requested while consuming
            Ok(()) => return,
            Err(e) => {
                warn!(
                    error = %e,
                    backoff = ?settings.backoff,
                    "consumer disconnected, backing off"
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(settings.backoff) => {}
            changed = stop.changed() => {
                // A dropped sender means the process is tearing down
                if changed.is_err() || *stop.borrow() {
                    return;
                }
            }
        }
    }
}

/// One CONNECTING + CONSUMING cycle.
///
/// Returns `Ok(())` only when shutdown is requested; every broker failure
/// surfaces as `Err` and sends the caller to BACKOFF.
async fn consume(
    settings: &ConsumerSettings,
    aggregator: &Aggregator,
    stop: &mut watch::Receiver<bool>,
) -> Result<()> {
    let conn = Connection::connect(&settings.amqp_url, ConnectionProperties::default()).await?;
    let channel = conn.create_channel().await?;

    channel
        .exchange_declare(
            &settings.exchange,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    // Server-named exclusive queue: gone when this connection goes, so every
    // reconnect starts a fresh subscription
    let queue = channel
        .queue_declare(
            "",
            QueueDeclareOptions {
                exclusive: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            queue.name().as_str(),
            &settings.exchange,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let mut deliveries = channel
        .basic_consume(
            queue.name().as_str(),
            "convertly-stats",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!(queue = %queue.name(), exchange = %settings.exchange, "consuming telemetry events");

    loop {
        tokio::select! {
            delivery = deliveries.next() => {
                let delivery = match delivery {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(anyhow!("delivery stream closed")),
                };

                apply_payload(aggregator, &delivery.data);

                // Ack after processing: a crash before this point redelivers
                delivery.ack(BasicAckOptions::default()).await?;
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    info!("shutdown requested, closing consumer connection");
                    let _ = conn.close(200, "shutdown").await;
                    return Ok(());
                }
            }
        }
    }
}

/// Decode one message body and fold it into the aggregator.
///
/// An undecodable body is discarded with a warning; it still gets acked by
/// the caller so it never wedges the queue.
fn apply_payload(aggregator: &Aggregator, payload: &[u8]) {
    match serde_json::from_slice::<Event>(payload) {
        Ok(event) => {
            debug!(service = %event.service, kind = %event.kind, ts = event.ts, "applying event");
            aggregator.apply(&event);
        }
        Err(e) => {
            warn!(error = %e, len = payload.len(), "discarding undecodable event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_payload_is_applied() {
        let agg = Aggregator::new();
        apply_payload(
            &agg,
            br#"{"service":"image-service","event":"convert_success","ts":100,"output_format":"PNG"}"#,
        );

        let snap = agg.snapshot();
        assert_eq!(snap.total_conversions, 1);
        assert_eq!(snap.by_format.get("png"), Some(&1));
        assert_eq!(snap.last_event_ts, Some(100));
    }

    #[test]
    fn malformed_payload_leaves_counters_unchanged() {
        let agg = Aggregator::new();
        apply_payload(&agg, b"not json at all");
        apply_payload(&agg, b"{\"service\":\"x\"}");
        apply_payload(&agg, &[0xff, 0xfe]);

        assert_eq!(agg.snapshot(), convertly_types::MetricsSnapshot::new());
    }

    #[test]
    fn malformed_payload_does_not_halt_subsequent_processing() {
        let agg = Aggregator::new();
        apply_payload(
            &agg,
            br#"{"service":"s","event":"convert_success","ts":1,"output_format":"png"}"#,
        );
        apply_payload(&agg, b"garbage");
        apply_payload(&agg, br#"{"service":"s","event":"convert_error","ts":2}"#);

        let snap = agg.snapshot();
        assert_eq!(snap.total_conversions, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.last_event_ts, Some(2));
    }

    #[test]
    fn unknown_kind_payload_updates_timestamp_only() {
        let agg = Aggregator::new();
        apply_payload(
            &agg,
            br#"{"service":"pdf-service","event":"convert_queued","ts":9}"#,
        );

        let snap = agg.snapshot();
        assert_eq!(snap.total_conversions, 0);
        assert_eq!(snap.errors, 0);
        assert_eq!(snap.last_event_ts, Some(9));
    }

    #[tokio::test]
    async fn run_exits_when_stop_is_already_set() {
        let (tx, rx) = watch::channel(true);
        let settings = ConsumerSettings {
            amqp_url: "amqp://127.0.0.1:1/%2f".to_string(),
            exchange: "metrics".to_string(),
            backoff: Duration::from_millis(10),
        };

        run(settings, Arc::new(Aggregator::new()), rx).await;
        drop(tx);
    }

    #[tokio::test]
    async fn run_backs_off_on_unreachable_broker_and_honors_shutdown() {
        let (tx, rx) = watch::channel(false);
        let settings = ConsumerSettings {
            // Nothing listens here, so every connect attempt fails fast
            amqp_url: "amqp://127.0.0.1:1/%2f".to_string(),
            exchange: "metrics".to_string(),
            backoff: Duration::from_millis(20),
        };

        let handle = spawn(settings, Arc::new(Aggregator::new()), rx);

        // Let it cycle through a few connect failures, then stop it
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("consumer did not stop after shutdown signal")
            .unwrap();
    }
}
