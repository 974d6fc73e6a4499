//! The agent: consumes the message stream, tracks senders, answers commands,
//! and broadcasts a greeting on a timer.
//!
//! Everything runs on one task. The stream loop and the broadcast loop are
//! joined, so either can make progress while the other waits on the network.
//! Session state sits behind a mutex that is never held across a network call.

use crate::broadcast::{broadcast_tick, BroadcastReport};
use crate::commands::{self, CommandContext, GREETING};
use crate::config::{self, Config, Credentials};
use crate::identity::{EncryptionKey, Signer};
use crate::names::{BasenameResolver, NameResolver};
use crate::network::{BridgeClient, ClientError, Message, MessageStream, MessagingClient};
use crate::reconnect::{transition, Phase, RetryPolicy, StreamEvent};
use crate::session::{MessageRecord, SessionState};
use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Runtime knobs for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub broadcast_interval: Duration,
    /// Sent to each active conversation per tick, in order.
    pub broadcast_messages: Vec<String>,
    /// Reply to "gm" and the first message of `/start`.
    pub greeting: String,
    pub retry: RetryPolicy,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            broadcast_interval: Duration::from_secs(30),
            broadcast_messages: vec![GREETING.to_string()],
            greeting: GREETING.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            broadcast_interval: config.broadcast.interval(),
            broadcast_messages: config.broadcast.payload(),
            ..Self::default()
        }
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Recorded (and answered, for text).
    Processed,
    /// Sent by the agent itself.
    OwnMessage,
    /// The sender's inbox has no wallet address.
    UnknownSender,
    /// The client does not know the conversation.
    UnknownConversation,
    /// Processing failed; an error notice was attempted.
    Failed,
}

pub struct Agent {
    client: Arc<dyn MessagingClient>,
    resolver: Arc<dyn NameResolver>,
    settings: AgentSettings,
    state: Mutex<SessionState>,
}

impl Agent {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        resolver: Arc<dyn NameResolver>,
        settings: AgentSettings,
        state: SessionState,
    ) -> Self {
        Self {
            client,
            resolver,
            settings,
            state: Mutex::new(state),
        }
    }

    /// Lock the session state. Do not hold the guard across a network call.
    pub async fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Process one message. Errors are contained here: logged, and reported into
    /// the originating conversation on a best-effort basis.
    pub async fn handle_message(&self, msg: &Message) -> Ingest {
        match self.process_message(msg).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!(
                    "failed to process message {} in {}: {}",
                    msg.id,
                    msg.conversation_id,
                    e
                );
                self.report_error(&msg.conversation_id, &e).await;
                Ingest::Failed
            }
        }
    }

    async fn process_message(&self, msg: &Message) -> Result<Ingest, ClientError> {
        if msg
            .sender_inbox_id
            .eq_ignore_ascii_case(self.client.inbox_id())
        {
            return Ok(Ingest::OwnMessage);
        }

        let Some(address) = self
            .client
            .resolve_address_for_inbox_id(&msg.sender_inbox_id)
            .await?
        else {
            log::debug!("no address for inbox {}, skipping", msg.sender_inbox_id);
            return Ok(Ingest::UnknownSender);
        };

        self.state.lock().await.record_message(MessageRecord {
            sender_inbox_id: msg.sender_inbox_id.clone(),
            address: address.clone(),
            received_at: Utc::now(),
            conversation_id: msg.conversation_id.clone(),
            content: msg.text().map(str::to_string),
            content_type: msg.content_type.clone(),
        });

        let Some(conversation) = self
            .client
            .get_conversation_by_id(&msg.conversation_id)
            .await?
        else {
            log::debug!("conversation {} not found, skipping", msg.conversation_id);
            return Ok(Ingest::UnknownConversation);
        };

        let added = self
            .state
            .lock()
            .await
            .activate_conversation(&msg.conversation_id);
        if added {
            log::info!("conversation {} is now active", msg.conversation_id);
        }

        if let Some(text) = msg.text() {
            let ctx = CommandContext {
                conversation: conversation.as_ref(),
                resolver: self.resolver.as_ref(),
                sender_inbox_id: &msg.sender_inbox_id,
                sender_address: &address,
                greeting: &self.settings.greeting,
            };
            commands::dispatch(text, &ctx, &self.state).await?;
            self.state.lock().await.record_response(
                &msg.sender_inbox_id,
                &address,
                &msg.conversation_id,
                Utc::now(),
            );
        }
        Ok(Ingest::Processed)
    }

    async fn report_error(&self, conversation_id: &str, error: &ClientError) {
        let conversation = match self.client.get_conversation_by_id(conversation_id).await {
            Ok(Some(c)) => c,
            Ok(None) => return,
            Err(e) => {
                log::warn!("could not look up {} to report error: {}", conversation_id, e);
                return;
            }
        };
        let notice = format!("Sorry, something went wrong while processing your message: {}", error);
        if let Err(e) = conversation.send(&notice).await {
            log::warn!("failed to send error notice to {}: {}", conversation_id, e);
        }
    }

    /// One broadcast timer firing.
    pub async fn broadcast_tick(&self) -> BroadcastReport {
        broadcast_tick(
            self.client.as_ref(),
            &self.state,
            &self.settings.broadcast_messages,
        )
        .await
    }

    /// Run the message stream and the broadcast timer until the future is dropped.
    /// Neither loop waits on the other.
    pub async fn run(&self) {
        log::info!(
            "agent running as inbox {}; broadcasting every {}s",
            self.client.inbox_id(),
            self.settings.broadcast_interval.as_secs()
        );
        tokio::join!(self.run_stream(), self.run_broadcasts());
    }

    async fn run_broadcasts(&self) {
        let period = self.settings.broadcast_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.broadcast_tick().await;
        }
    }

    /// Sync, stream, back off on failure, repeat.
    async fn run_stream(&self) {
        let mut phase = Phase::Connecting;
        let mut stream: Option<MessageStream> = None;
        loop {
            let event = match phase {
                Phase::Connecting => self.connect(&mut stream).await,
                Phase::Streaming => match stream.as_mut() {
                    Some(s) => self.consume(s).await,
                    None => StreamEvent::StreamEnded,
                },
                Phase::Backoff => {
                    stream = None;
                    let delay = self.settings.retry.backoff;
                    log::info!("retrying message stream in {}s", delay.as_secs_f32());
                    tokio::time::sleep(delay).await;
                    StreamEvent::BackoffElapsed
                }
            };
            phase = match transition(phase, event) {
                Ok(next) => next,
                Err(e) => {
                    log::error!("stream state machine: {}; restarting from backoff", e);
                    Phase::Backoff
                }
            };
            log::debug!("stream phase: {}", phase);
        }
    }

    /// Re-sync conversations (failure is logged, not fatal) and open a new stream.
    async fn connect(&self, stream: &mut Option<MessageStream>) -> StreamEvent {
        if let Err(e) = self.client.sync_conversations().await {
            log::warn!("conversation sync failed: {}", e);
        }
        match self.client.stream_messages().await {
            Ok(s) => {
                log::info!("message stream opened");
                *stream = Some(s);
                StreamEvent::StreamOpened
            }
            Err(e) => {
                log::warn!("opening message stream failed: {}", e);
                StreamEvent::StreamOpenFailed
            }
        }
    }

    /// Consume the stream until it fails or ends.
    async fn consume(&self, stream: &mut MessageStream) -> StreamEvent {
        loop {
            match stream.next().await {
                Some(Ok(msg)) => {
                    self.handle_message(&msg).await;
                }
                Some(Err(e)) => {
                    log::warn!("message stream failed: {}", e);
                    return StreamEvent::StreamFailed;
                }
                None => {
                    log::warn!("message stream ended");
                    return StreamEvent::StreamEnded;
                }
            }
        }
    }
}

/// Build the signer, connect to the bridge, and run the agent until the process is
/// interrupted. Initialisation failures are returned; stream failures never are.
pub async fn run_agent(config: Config, credentials: Credentials) -> Result<()> {
    let signer = Signer::from_hex(&credentials.wallet_key).context("parsing WALLET_KEY")?;
    let encryption_key =
        EncryptionKey::from_hex(&credentials.encryption_key).context("parsing ENCRYPTION_KEY")?;
    let bridge_url = config::resolve_bridge_url(&config);
    let client = BridgeClient::connect(&bridge_url, &signer, &encryption_key, credentials.env)
        .await
        .with_context(|| format!("connecting to bridge at {}", bridge_url))?;
    log::info!(
        "wallet {} connected on {} (network id {})",
        client.address(),
        client.env(),
        credentials.network_id
    );

    let resolver = BasenameResolver::new(config::resolver_settings(&config, credentials.network_id))
        .context("building name resolver")?;
    let state = SessionState::new(config.history.limit, config.broadcast.start_active);
    let agent = Agent::new(
        Arc::new(client),
        Arc::new(resolver),
        AgentSettings::from_config(&config),
        state,
    );

    tokio::select! {
        _ = agent.run() => {},
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupt received, exiting");
        }
    }
    Ok(())
}
