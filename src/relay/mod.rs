//! Live push delivery over a relay connection.

pub mod client;

pub use client::{ConnectionState, MessageHandler, RelayClient};
