//! Messaging network seam.
//!
//! `MessagingClient` and `Conversation` are the only capabilities the agent
//! needs from the network. `BridgeClient` implements them against a local
//! bridge daemon over HTTP, with inbound messages streamed as NDJSON.

mod bridge;
mod client;
mod types;

pub use bridge::BridgeClient;
pub use client::{ClientError, Conversation, MessageStream, MessagingClient};
pub use types::{Member, Message, CONTENT_TYPE_TEXT};
