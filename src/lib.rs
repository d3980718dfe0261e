//! agent-msg library root.
//!
//! Agents exchange text messages through two independent channels:
//! - a durable file-per-message [`Mailbox`] (store and forward, polled)
//! - a live [`RelayClient`] WebSocket connection (push, not durable)
//!
//! [`Messenger`] binds both to one agent name.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod messenger;
pub mod protocol;
pub mod relay;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use error::{Error, Result};
pub use messenger::Messenger;
pub use protocol::{DrainReport, Envelope, Mailbox, RelayFrame, RelayMessage};
pub use relay::{ConnectionState, RelayClient};
