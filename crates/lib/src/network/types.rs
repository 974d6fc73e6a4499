//! Wire types shared by the client trait and the bridge implementation.

use serde::Deserialize;

/// Content-type tag of plain text messages.
pub const CONTENT_TYPE_TEXT: &str = "text";

/// An inbound message from the network stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_inbox_id: String,
    pub content_type: String,
    /// Decoded body; only meaningful when `content_type` is text.
    #[serde(default)]
    pub content: Option<String>,
}

impl Message {
    pub fn is_text(&self) -> bool {
        self.content_type == CONTENT_TYPE_TEXT
    }

    /// Text body when this is a text message.
    pub fn text(&self) -> Option<&str> {
        if self.is_text() {
            self.content.as_deref()
        } else {
            None
        }
    }
}

/// A conversation participant and the wallet addresses bound to its inbox.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub inbox_id: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_body_only_for_text_messages() {
        let json = r#"{"id":"m1","conversationId":"c1","senderInboxId":"i1","contentType":"text","content":"gm"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.text(), Some("gm"));

        let json = r#"{"id":"m2","conversationId":"c1","senderInboxId":"i1","contentType":"reaction","content":"👍"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(!msg.is_text());
        assert_eq!(msg.text(), None);
    }
}
