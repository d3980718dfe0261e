//! Message envelopes exchanged between agents.

use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One message from one agent to another.
///
/// The same shape is used on disk (one pretty-printed JSON file per pending
/// envelope) and in memory. Fields are all strings so stored messages stay
/// human readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message ID (ULID, sorts by creation time)
    pub id: String,
    /// Sender agent name
    pub from: String,
    /// Recipient agent name
    pub to: String,
    /// Message body
    pub message: String,
    /// Creation time, RFC 3339 / ISO-8601 UTC
    pub timestamp: String,
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    pub fn new(from: impl Into<String>, to: impl Into<String>, message: impl Into<String>) -> Self {
        Self::create(from, to, message, Utc::now())
    }

    /// Create an envelope for a given creation time.
    ///
    /// Everything except the random part of `id` is derived from the inputs.
    /// The recipient is not checked against any registry and an empty
    /// message is allowed.
    pub fn create(
        from: impl Into<String>,
        to: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(now),
            from: from.into(),
            to: to.into(),
            message: message.into(),
            timestamp: format_timestamp(now),
        }
    }

    /// File name used when this envelope sits in an inbox.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, super::ENVELOPE_EXTENSION)
    }
}

fn generate_id(now: DateTime<Utc>) -> String {
    ulid::Ulid::from_datetime(SystemTime::from(now)).to_string()
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub(crate) fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}
