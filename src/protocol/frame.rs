//! Relay wire frames.
//!
//! Frames are JSON objects tagged by a `type` field. Only `message` frames
//! carry anything this crate acts on; any other `type` decodes as
//! [`RelayFrame::Unknown`] and is ignored by the receiver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::envelope::format_timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    Message(RelayMessage),
    #[serde(other)]
    Unknown,
}

/// Envelope-shaped payload pushed over a relay connection.
///
/// Relay messages carry no id: the relay channel does not share identity
/// space with mailbox envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub from: String,
    pub to: String,
    pub message: String,
    pub timestamp: String,
}

impl RelayMessage {
    pub fn create(
        from: impl Into<String>,
        to: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            message: message.into(),
            timestamp: format_timestamp(now),
        }
    }
}

impl RelayFrame {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
