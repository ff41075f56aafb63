//! # convertly-stats
//!
//! The aggregation side of the convertly telemetry pipeline: a long-lived
//! consumer bound to the `metrics` fanout exchange, an in-memory rollup of
//! conversion counters, and an HTTP endpoint serving the current snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      convertly-stats                         │
//! │                                                              │
//! │  RabbitMQ ──▶ consumer (reconnect loop) ──▶ Aggregator       │
//! │  (fanout)        one background task          apply()        │
//! │                                                 │            │
//! │                                                 ▼            │
//! │  GET /metrics ◀── axum handlers ◀────────── snapshot()       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`consumer`]**: owns the CONNECTING / CONSUMING / BACKOFF loop against
//!   the broker; survives outages indefinitely and only ends on shutdown
//! - **[`aggregator`]**: the single-writer / multi-reader counter state
//! - **[`http`]**: the read endpoint (`/metrics`) and liveness probe
//!   (`/health`)
//! - **[`settings`]**: config file, environment, and CLI override plumbing
//!
//! The aggregate state lives for the process only; a restart starts the
//! rollup from zero. Events published while the consumer is disconnected are
//! lost, which is an accepted trade-off of the fresh exclusive queue per
//! connection.

pub mod aggregator;
pub mod consumer;
pub mod http;
pub mod settings;

pub use aggregator::Aggregator;
pub use consumer::ConsumerSettings;
pub use settings::Settings;
