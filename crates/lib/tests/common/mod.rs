//! In-memory messaging network and name resolver for agent tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use lib::names::{NameResolver, Profile};
use lib::network::{ClientError, Conversation, Member, Message, MessageStream, MessagingClient};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

pub const AGENT_INBOX: &str = "agent-inbox";

#[derive(Default)]
struct Network {
    conversations: HashSet<String>,
    failing: HashSet<String>,
    addresses: HashMap<String, String>,
    members: HashMap<String, Vec<Member>>,
    streams: VecDeque<Vec<Result<Message, ClientError>>>,
    sent: Vec<(String, String)>,
    sync_calls: usize,
    stream_calls: usize,
    address_lookup_error: Option<String>,
}

/// Fake client; clones share the same network.
#[derive(Clone, Default)]
pub struct FakeClient {
    net: Arc<Mutex<Network>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_conversation(&self, id: &str) {
        self.net.lock().unwrap().conversations.insert(id.to_string());
    }

    pub fn remove_conversation(&self, id: &str) {
        self.net.lock().unwrap().conversations.remove(id);
    }

    pub fn fail_sends_to(&self, id: &str) {
        self.net.lock().unwrap().failing.insert(id.to_string());
    }

    pub fn heal_sends_to(&self, id: &str) {
        self.net.lock().unwrap().failing.remove(id);
    }

    pub fn add_sender(&self, inbox_id: &str, address: &str) {
        self.net
            .lock()
            .unwrap()
            .addresses
            .insert(inbox_id.to_string(), address.to_string());
    }

    pub fn set_members(&self, conversation_id: &str, members: Vec<Member>) {
        self.net
            .lock()
            .unwrap()
            .members
            .insert(conversation_id.to_string(), members);
    }

    /// Make every inbox-to-address lookup fail with `reason`.
    pub fn fail_address_lookups(&self, reason: &str) {
        self.net.lock().unwrap().address_lookup_error = Some(reason.to_string());
    }

    /// Queue the items of the next stream. Once all queued streams are used up,
    /// further streams stay open without yielding.
    pub fn queue_stream(&self, items: Vec<Result<Message, ClientError>>) {
        self.net.lock().unwrap().streams.push_back(items);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.net.lock().unwrap().sent.clone()
    }

    pub fn sent_to(&self, conversation_id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == conversation_id)
            .map(|(_, t)| t)
            .collect()
    }

    pub fn clear_sent(&self) {
        self.net.lock().unwrap().sent.clear();
    }

    pub fn sync_calls(&self) -> usize {
        self.net.lock().unwrap().sync_calls
    }

    pub fn stream_calls(&self) -> usize {
        self.net.lock().unwrap().stream_calls
    }
}

#[async_trait]
impl MessagingClient for FakeClient {
    fn inbox_id(&self) -> &str {
        AGENT_INBOX
    }

    async fn sync_conversations(&self) -> Result<(), ClientError> {
        self.net.lock().unwrap().sync_calls += 1;
        Ok(())
    }

    async fn stream_messages(&self) -> Result<MessageStream, ClientError> {
        let mut net = self.net.lock().unwrap();
        net.stream_calls += 1;
        match net.streams.pop_front() {
            Some(items) => Ok(stream::iter(items).boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn get_conversation_by_id(
        &self,
        id: &str,
    ) -> Result<Option<Arc<dyn Conversation>>, ClientError> {
        let net = self.net.lock().unwrap();
        if !net.conversations.contains(id) {
            return Ok(None);
        }
        Ok(Some(Arc::new(FakeConversation {
            id: id.to_string(),
            net: self.net.clone(),
        })))
    }

    async fn resolve_address_for_inbox_id(
        &self,
        inbox_id: &str,
    ) -> Result<Option<String>, ClientError> {
        let net = self.net.lock().unwrap();
        if let Some(ref reason) = net.address_lookup_error {
            return Err(ClientError::Api(reason.clone()));
        }
        Ok(net.addresses.get(inbox_id).cloned())
    }
}

struct FakeConversation {
    id: String,
    net: Arc<Mutex<Network>>,
}

#[async_trait]
impl Conversation for FakeConversation {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, text: &str) -> Result<(), ClientError> {
        let mut net = self.net.lock().unwrap();
        if net.failing.contains(&self.id) {
            return Err(ClientError::Api(format!("conversation {} is closed", self.id)));
        }
        net.sent.push((self.id.clone(), text.to_string()));
        Ok(())
    }

    async fn members(&self) -> Result<Vec<Member>, ClientError> {
        Ok(self
            .net
            .lock()
            .unwrap()
            .members
            .get(&self.id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Resolver backed by a fixed address -> profile map.
#[derive(Default)]
pub struct FakeResolver {
    profiles: HashMap<String, Profile>,
}

impl FakeResolver {
    pub fn with_name(mut self, address: &str, name: &str) -> Self {
        self.profiles.insert(
            address.to_ascii_lowercase(),
            Profile {
                name: name.to_string(),
                ..Profile::default()
            },
        );
        self
    }
}

#[async_trait]
impl NameResolver for FakeResolver {
    async fn resolve_display_name(&self, address: &str) -> Option<String> {
        self.profiles
            .get(&address.to_ascii_lowercase())
            .map(|p| p.name.clone())
    }

    async fn resolve_profile(&self, address: &str) -> Option<Profile> {
        self.profiles.get(&address.to_ascii_lowercase()).cloned()
    }
}

/// Resolver whose lookups never complete.
pub struct HangingResolver;

#[async_trait]
impl NameResolver for HangingResolver {
    async fn resolve_display_name(&self, _address: &str) -> Option<String> {
        std::future::pending().await
    }

    async fn resolve_profile(&self, _address: &str) -> Option<Profile> {
        std::future::pending().await
    }
}

pub fn text_message(conversation_id: &str, sender_inbox_id: &str, text: &str) -> Message {
    Message {
        id: format!("msg-{}-{}", conversation_id, text.len()),
        conversation_id: conversation_id.to_string(),
        sender_inbox_id: sender_inbox_id.to_string(),
        content_type: "text".to_string(),
        content: Some(text.to_string()),
    }
}

pub fn reaction_message(conversation_id: &str, sender_inbox_id: &str) -> Message {
    Message {
        id: format!("reaction-{}", conversation_id),
        conversation_id: conversation_id.to_string(),
        sender_inbox_id: sender_inbox_id.to_string(),
        content_type: "reaction".to_string(),
        content: Some("👍".to_string()),
    }
}
