//! The conversion telemetry event record.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind tag of a telemetry event.
///
/// The set of kinds is open-ended by convention: producers may start emitting
/// new tags before every consumer understands them, so anything other than
/// the known tags deserializes into [`EventKind::Other`] rather than failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A conversion completed successfully.
    ConvertSuccess,
    /// A conversion failed.
    ConvertError,
    /// Any kind this version of the schema does not know about.
    #[serde(untagged)]
    Other(String),
}

impl EventKind {
    /// The wire representation of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ConvertSuccess => "convert_success",
            EventKind::ConvertError => "convert_error",
            EventKind::Other(tag) => tag,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The detail bag attached to an event.
///
/// Known fields are typed and omitted from the wire when unset. Unknown
/// fields survive a decode/encode round trip through `extra`, so an older
/// consumer can forward events it does not fully understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    /// Target format of a successful conversion (e.g. "PNG", "webp").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    /// Human-readable failure description for error events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Input filename, when the producer knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Any additional fields merged into the message body.
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EventDetails {
    /// Create an empty detail bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output format.
    pub fn output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }

    /// Set the error description.
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set the input filename.
    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Attach an arbitrary additional field.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A single telemetry event as carried on the `metrics` exchange.
///
/// The message body is a flat UTF-8 JSON object: `service`, `event` (the kind
/// tag), `ts` (epoch seconds), plus the detail fields merged in at the top
/// level. [`EventDetails`] is flattened to match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identity of the emitting producer.
    pub service: String,

    /// What happened.
    #[serde(rename = "event")]
    pub kind: EventKind,

    /// Seconds since the Unix epoch, stamped by the publisher at emission.
    pub ts: u64,

    /// Optional detail fields, flattened into the message body.
    #[serde(flatten)]
    pub details: EventDetails,
}

impl Event {
    /// Create an event with an explicit timestamp.
    pub fn new(
        service: impl Into<String>,
        kind: EventKind,
        ts: u64,
        details: EventDetails,
    ) -> Self {
        Self {
            service: service.into(),
            kind,
            ts,
            details,
        }
    }

    /// Create an event stamped with the current time.
    pub fn now(service: impl Into<String>, kind: EventKind, details: EventDetails) -> Self {
        Self::new(service, kind, epoch_seconds(), details)
    }
}

/// Current time in whole seconds since the Unix epoch.
fn epoch_seconds() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
