//! # convertly-types
//!
//! Wire schema for convertly conversion telemetry. This crate defines the
//! event record that producer services publish onto the `metrics` fanout
//! exchange, and the snapshot shape the stats service serves back to
//! dashboards.
//!
//! ## Design Goals
//!
//! - **Stable wire names**: field names on the wire (`service`, `event`, `ts`)
//!   are part of the broker contract and never change, whatever the Rust-side
//!   names are
//! - **Forward compatible**: unrecognized event kinds and unknown detail
//!   fields deserialize without error instead of crashing a consumer
//! - **Schema-light details**: known optional fields (`output_format`,
//!   `error`, `input`) are typed; anything else rides along in an extras map
//!
//! ## Example
//!
//! ```rust
//! use convertly_types::{Event, EventDetails, EventKind};
//!
//! let event = Event::new(
//!     "image-service",
//!     EventKind::ConvertSuccess,
//!     1703160000,
//!     EventDetails::new().output_format("PNG").input("cat.jpg"),
//! );
//!
//! let json = serde_json::to_value(&event).unwrap();
//! assert_eq!(json["event"], "convert_success");
//! assert_eq!(json["output_format"], "PNG");
//! ```

mod event;
mod snapshot;

pub use event::*;
pub use snapshot::*;
