//! Message model and durable storage for agent-msg.
//!
//! - Envelopes with sortable unique IDs
//! - Relay wire frames
//! - File-per-message agent mailboxes

pub mod envelope;
pub mod frame;
pub mod mailbox;

/// Extension of stored envelope files.
pub const ENVELOPE_EXTENSION: &str = "json";

pub use envelope::Envelope;
pub use frame::{RelayFrame, RelayMessage};
pub use mailbox::{DrainReport, Mailbox};
