//! In-memory session state shared by the ingestion loop, the broadcast timer,
//! and the command dispatcher.
//!
//! One value owns every collection. The agent keeps it behind a
//! `tokio::sync::Mutex` and never holds the lock across a network call.
//! Nothing here is persisted.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// One inbound message accepted for tracking. Never mutated after append.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub sender_inbox_id: String,
    pub address: String,
    pub received_at: DateTime<Utc>,
    pub conversation_id: String,
    /// Set only for text messages.
    pub content: Option<String>,
    pub content_type: String,
}

/// Last time the agent replied to a given sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponseRecord {
    pub sender_inbox_id: String,
    pub address: String,
    pub last_response_at: DateTime<Utc>,
    pub conversation_id: String,
}

/// Gate for the periodic broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastingControl {
    active: bool,
}

impl BroadcastingControl {
    pub fn new(active: bool) -> Self {
        Self { active }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }
}

/// Tracked state for one agent run.
#[derive(Debug)]
pub struct SessionState {
    active_conversations: BTreeSet<String>,
    history: VecDeque<MessageRecord>,
    /// Max history entries kept; 0 keeps everything.
    history_limit: usize,
    total_messages: u64,
    sender_inbox_ids: HashSet<String>,
    sender_addresses: HashSet<String>,
    messages_by_address: HashMap<String, u64>,
    responses: HashMap<String, AgentResponseRecord>,
    pub broadcasting: BroadcastingControl,
}

impl SessionState {
    pub fn new(history_limit: usize, broadcasting_active: bool) -> Self {
        Self {
            active_conversations: BTreeSet::new(),
            history: VecDeque::new(),
            history_limit,
            total_messages: 0,
            sender_inbox_ids: HashSet::new(),
            sender_addresses: HashSet::new(),
            messages_by_address: HashMap::new(),
            responses: HashMap::new(),
            broadcasting: BroadcastingControl::new(broadcasting_active),
        }
    }

    /// Append a record and update sender counters, evicting the oldest entry when full.
    pub fn record_message(&mut self, record: MessageRecord) {
        self.total_messages += 1;
        self.sender_inbox_ids.insert(record.sender_inbox_id.clone());
        let address = record.address.to_ascii_lowercase();
        *self.messages_by_address.entry(address.clone()).or_insert(0) += 1;
        self.sender_addresses.insert(address);
        self.history.push_back(record);
        if self.history_limit > 0 {
            while self.history.len() > self.history_limit {
                self.history.pop_front();
            }
        }
    }

    /// Returns true if the conversation was not already active.
    pub fn activate_conversation(&mut self, conversation_id: &str) -> bool {
        self.active_conversations.insert(conversation_id.to_string())
    }

    /// Returns true if the conversation was active.
    pub fn deactivate_conversation(&mut self, conversation_id: &str) -> bool {
        self.active_conversations.remove(conversation_id)
    }

    pub fn is_conversation_active(&self, conversation_id: &str) -> bool {
        self.active_conversations.contains(conversation_id)
    }

    /// Snapshot of active conversation ids, in sorted order.
    pub fn active_conversations(&self) -> Vec<String> {
        self.active_conversations.iter().cloned().collect()
    }

    #[cfg(test)]
    fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Up to `n` most recent records, newest first.
    pub fn recent_messages(&self, n: usize) -> Vec<&MessageRecord> {
        self.history.iter().rev().take(n).collect()
    }

    /// Every message ever recorded, including evicted ones.
    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    /// Distinct wallet addresses seen.
    pub fn unique_sender_count(&self) -> usize {
        self.sender_addresses.len()
    }

    /// Distinct inbox ids seen.
    pub fn unique_inbox_count(&self) -> usize {
        self.sender_inbox_ids.len()
    }

    /// Top `n` addresses by message count; ties broken by address.
    pub fn top_senders(&self, n: usize) -> Vec<(String, u64)> {
        let mut counts: Vec<(String, u64)> = self
            .messages_by_address
            .iter()
            .map(|(a, c)| (a.clone(), *c))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(n);
        counts
    }

    /// Most recent record posted in the given conversation.
    pub fn last_message_in(&self, conversation_id: &str) -> Option<&MessageRecord> {
        self.history
            .iter()
            .rev()
            .find(|r| r.conversation_id == conversation_id)
    }

    /// Create or refresh the sender's response record. The timestamp never moves backwards.
    pub fn record_response(
        &mut self,
        sender_inbox_id: &str,
        address: &str,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) {
        match self.responses.get_mut(sender_inbox_id) {
            Some(existing) => {
                existing.last_response_at = existing.last_response_at.max(at);
                existing.address = address.to_string();
                existing.conversation_id = conversation_id.to_string();
            }
            None => {
                self.responses.insert(
                    sender_inbox_id.to_string(),
                    AgentResponseRecord {
                        sender_inbox_id: sender_inbox_id.to_string(),
                        address: address.to_string(),
                        last_response_at: at,
                        conversation_id: conversation_id.to_string(),
                    },
                );
            }
        }
    }

    pub fn response_for(&self, sender_inbox_id: &str) -> Option<&AgentResponseRecord> {
        self.responses.get(sender_inbox_id)
    }

    /// Response records, most recent first.
    pub fn responses_by_recency(&self) -> Vec<&AgentResponseRecord> {
        let mut out: Vec<&AgentResponseRecord> = self.responses.values().collect();
        out.sort_by(|a, b| {
            b.last_response_at
                .cmp(&a.last_response_at)
                .then_with(|| a.sender_inbox_id.cmp(&b.sender_inbox_id))
        });
        out
    }
}
