mod common;

use common::{reaction_message, text_message, FakeClient, FakeResolver, AGENT_INBOX};
use lib::agent::{Agent, AgentSettings, Ingest};
use lib::network::Member;
use lib::session::SessionState;
use std::sync::Arc;

const ALICE_INBOX: &str = "alice-inbox";
const ALICE: &str = "0xABC0000000000000000000000000000000000123";
const BOB_INBOX: &str = "bob-inbox";
const BOB: &str = "0xB0B0000000000000000000000000000000000456";

fn setup(broadcasting: bool) -> (FakeClient, Agent) {
    let client = FakeClient::new();
    client.add_conversation("conv1");
    client.add_conversation("conv2");
    client.add_sender(ALICE_INBOX, ALICE);
    client.add_sender(BOB_INBOX, BOB);
    let resolver = FakeResolver::default().with_name(ALICE, "alice.base.eth");
    let agent = Agent::new(
        Arc::new(client.clone()),
        Arc::new(resolver),
        AgentSettings::default(),
        SessionState::new(0, broadcasting),
    );
    (client, agent)
}

#[tokio::test]
async fn gm_gets_exactly_one_reply() {
    let (client, agent) = setup(true);

    let outcome = agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "hello gm"))
        .await;

    assert_eq!(outcome, Ingest::Processed);
    assert_eq!(client.sent_to("conv1"), vec!["GM".to_string()]);
    let state = agent.state().await;
    assert_eq!(state.total_messages(), 1);
    assert!(state.is_conversation_active("conv1"));
    let response = state.response_for(ALICE_INBOX).expect("response recorded");
    assert_eq!(response.address, ALICE);
    assert_eq!(response.conversation_id, "conv1");
}

#[tokio::test]
async fn own_messages_are_ignored() {
    let (client, agent) = setup(true);

    let outcome = agent
        .handle_message(&text_message("conv1", AGENT_INBOX, "gm"))
        .await;

    assert_eq!(outcome, Ingest::OwnMessage);
    assert!(client.sent().is_empty());
    assert_eq!(agent.state().await.total_messages(), 0);
    assert!(agent.state().await.active_conversations().is_empty());
}

#[tokio::test]
async fn unknown_sender_is_skipped() {
    let (client, agent) = setup(true);

    let outcome = agent
        .handle_message(&text_message("conv1", "stranger-inbox", "gm"))
        .await;

    assert_eq!(outcome, Ingest::UnknownSender);
    assert!(client.sent().is_empty());
    assert_eq!(agent.state().await.total_messages(), 0);
}

#[tokio::test]
async fn unknown_conversation_is_recorded_but_not_answered() {
    let (client, agent) = setup(true);

    let outcome = agent
        .handle_message(&text_message("conv-missing", ALICE_INBOX, "gm"))
        .await;

    assert_eq!(outcome, Ingest::UnknownConversation);
    assert!(client.sent().is_empty());
    assert_eq!(agent.state().await.total_messages(), 1);
    assert!(!agent.state().await.is_conversation_active("conv-missing"));
    assert!(agent.state().await.response_for(ALICE_INBOX).is_none());
}

#[tokio::test]
async fn non_text_message_activates_without_reply() {
    let (client, agent) = setup(true);

    let outcome = agent
        .handle_message(&reaction_message("conv2", BOB_INBOX))
        .await;

    assert_eq!(outcome, Ingest::Processed);
    assert!(client.sent().is_empty());
    assert!(agent.state().await.is_conversation_active("conv2"));
    assert!(agent.state().await.response_for(BOB_INBOX).is_none());
}

#[tokio::test]
async fn plain_text_gets_no_reply_but_counts_as_handled() {
    let (client, agent) = setup(true);

    agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "hello there"))
        .await;

    assert!(client.sent().is_empty());
    assert_eq!(agent.state().await.total_messages(), 1);
    assert!(agent.state().await.response_for(ALICE_INBOX).is_some());
}

#[tokio::test]
async fn start_then_stop_toggles_broadcasting() {
    let (client, agent) = setup(false);

    agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "/start"))
        .await;
    assert!(agent.state().await.broadcasting.is_active());
    agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "/stop"))
        .await;
    assert!(!agent.state().await.broadcasting.is_active());

    let sent = client.sent_to("conv1");
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0], "GM");
    assert!(sent[1].contains("Broadcasting started"));
    assert!(sent[2].contains("Broadcasting stopped"));
}

#[tokio::test]
async fn status_is_idempotent() {
    let (client, agent) = setup(true);

    for _ in 0..3 {
        agent
            .handle_message(&text_message("conv1", ALICE_INBOX, "/STATUS"))
            .await;
    }

    let sent = client.sent_to("conv1");
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|s| s == "📡 Broadcasting status: active"));
    assert!(agent.state().await.broadcasting.is_active());
}

#[tokio::test]
async fn stats_count_messages_and_senders() {
    let (client, agent) = setup(true);

    agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "hello"))
        .await;
    agent
        .handle_message(&text_message("conv2", BOB_INBOX, "hi"))
        .await;
    agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "/stats"))
        .await;

    let sent = client.sent_to("conv1");
    assert_eq!(sent.len(), 1);
    let stats = &sent[0];
    assert!(stats.contains("Total messages: 3"), "{}", stats);
    assert!(stats.contains("Unique senders: 2"), "{}", stats);
    assert!(stats.contains("Unique inboxes: 2"), "{}", stats);
    assert!(stats.contains("1. alice.base.eth: 2 messages"), "{}", stats);
    assert!(stats.contains("2. 0xb0b000...000456: 1 message"), "{}", stats);
}

#[tokio::test]
async fn report_lists_responded_senders_newest_first() {
    let (client, agent) = setup(true);

    agent
        .handle_message(&text_message("conv2", BOB_INBOX, "gm"))
        .await;
    agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "/report"))
        .await;

    let report = client.sent_to("conv1").pop().expect("report sent");
    assert!(report.starts_with("📋 Response report"));
    assert!(report.contains("🟢 0xB0B000...000456 (active)"), "{}", report);
    // The requester's own /report is recorded after the reply is built.
    assert!(!report.contains("alice.base.eth"), "{}", report);
}

#[tokio::test]
async fn profile_uses_member_address() {
    let (client, agent) = setup(true);
    client.set_members(
        "conv1",
        vec![Member {
            inbox_id: ALICE_INBOX.to_string(),
            addresses: vec![ALICE.to_string()],
        }],
    );

    agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "/profile"))
        .await;
    agent
        .handle_message(&text_message("conv2", BOB_INBOX, "/profile"))
        .await;

    let alice = client.sent_to("conv1").pop().expect("profile sent");
    assert!(alice.starts_with("👤 alice.base.eth"), "{}", alice);
    let bob = client.sent_to("conv2").pop().expect("profile sent");
    assert!(bob.contains("No basename found"), "{}", bob);
}

#[tokio::test]
async fn failed_reply_is_contained_and_agent_keeps_going() {
    let (client, agent) = setup(true);
    client.fail_sends_to("conv1");

    let outcome = agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "gm"))
        .await;

    // The notice goes to the same failing conversation, so it is swallowed too.
    assert_eq!(outcome, Ingest::Failed);
    assert!(client.sent().is_empty());
    assert_eq!(agent.state().await.total_messages(), 1);

    // The agent keeps going.
    client.heal_sends_to("conv1");
    let outcome = agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "gm"))
        .await;
    assert_eq!(outcome, Ingest::Processed);
    assert_eq!(client.sent_to("conv1"), vec!["GM".to_string()]);
}

#[tokio::test]
async fn processing_error_is_reported_into_the_conversation() {
    let (client, agent) = setup(true);
    client.fail_address_lookups("identity service unavailable");

    let outcome = agent
        .handle_message(&text_message("conv1", ALICE_INBOX, "gm"))
        .await;

    assert_eq!(outcome, Ingest::Failed);
    let sent = client.sent_to("conv1");
    assert_eq!(sent.len(), 1);
    assert!(
        sent[0].starts_with("Sorry, something went wrong"),
        "{}",
        sent[0]
    );
    assert!(sent[0].contains("identity service unavailable"));
    assert_eq!(agent.state().await.total_messages(), 0);
}
