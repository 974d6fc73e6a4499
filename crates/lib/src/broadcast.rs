//! Periodic greeting to every active conversation.

use crate::network::{ClientError, MessagingClient};
use crate::session::SessionState;
use chrono::Utc;
use tokio::sync::Mutex;

/// Outcome of one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Conversations that received the payload.
    pub sent: Vec<String>,
    /// Conversations dropped from the active set after a failure.
    pub removed: Vec<String>,
}

/// Send `messages` (in order) to each active conversation. A no-op while broadcasting
/// is stopped. A failing conversation is removed from the active set and the tick
/// moves on to the next one. Sends run without holding the state lock.
pub async fn broadcast_tick(
    client: &dyn MessagingClient,
    state: &Mutex<SessionState>,
    messages: &[String],
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    let conversations = {
        let state = state.lock().await;
        if !state.broadcasting.is_active() {
            return report;
        }
        state.active_conversations()
    };
    for conversation_id in conversations {
        match send_to(client, &conversation_id, messages).await {
            Ok(true) => {
                let mut state = state.lock().await;
                let last_sender = state
                    .last_message_in(&conversation_id)
                    .map(|r| (r.sender_inbox_id.clone(), r.address.clone()));
                if let Some((inbox_id, address)) = last_sender {
                    state.record_response(&inbox_id, &address, &conversation_id, Utc::now());
                }
                report.sent.push(conversation_id);
            }
            Ok(false) => {
                log::debug!("broadcast: conversation {} not found, skipping", conversation_id);
            }
            Err(e) => {
                log::warn!(
                    "broadcast: send to {} failed, removing from active set: {}",
                    conversation_id,
                    e
                );
                state.lock().await.deactivate_conversation(&conversation_id);
                report.removed.push(conversation_id);
            }
        }
    }
    if !report.sent.is_empty() || !report.removed.is_empty() {
        log::info!(
            "broadcast: sent to {} conversation(s), removed {}",
            report.sent.len(),
            report.removed.len()
        );
    }
    report
}

/// `Ok(false)` when the conversation no longer exists on the client.
async fn send_to(
    client: &dyn MessagingClient,
    conversation_id: &str,
    messages: &[String],
) -> Result<bool, ClientError> {
    let Some(conversation) = client.get_conversation_by_id(conversation_id).await? else {
        return Ok(false);
    };
    for text in messages {
        conversation.send(text).await?;
    }
    Ok(true)
}
