//! Client traits: what the agent consumes from the messaging network.

use crate::network::types::{Member, Message};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("network api error: {0}")]
    Api(String),
    #[error("message stream error: {0}")]
    Stream(String),
    #[error("identity error: {0}")]
    Identity(#[from] crate::identity::IdentityError),
}

/// Infinite message stream. Not restartable: request a new one after it fails.
pub type MessageStream = BoxStream<'static, Result<Message, ClientError>>;

/// Handle to one conversation.
#[async_trait]
pub trait Conversation: Send + Sync {
    fn id(&self) -> &str;

    /// Send a text message into the conversation.
    async fn send(&self, text: &str) -> Result<(), ClientError>;

    /// Current participants.
    async fn members(&self) -> Result<Vec<Member>, ClientError>;
}

/// Connected client for the agent's own inbox.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Inbox id of the agent itself.
    fn inbox_id(&self) -> &str;

    async fn sync_conversations(&self) -> Result<(), ClientError>;

    async fn stream_messages(&self) -> Result<MessageStream, ClientError>;

    /// `Ok(None)` when the conversation is unknown to the client.
    async fn get_conversation_by_id(
        &self,
        id: &str,
    ) -> Result<Option<Arc<dyn Conversation>>, ClientError>;

    /// Wallet address bound to an inbox, if any.
    async fn resolve_address_for_inbox_id(
        &self,
        inbox_id: &str,
    ) -> Result<Option<String>, ClientError>;
}
