//! Chat commands: `/start`, `/stop`, `/status`, `/stats`, `/report`, `/profile`,
//! and the "gm" greeting fallback.
//!
//! Parsing and rendering are pure; `dispatch` performs the sends and the
//! broadcasting toggle against state supplied by the caller.

use crate::names::{display_name, short_address, NameResolver, Profile};
use crate::network::{ClientError, Conversation};
use crate::session::SessionState;
use chrono::{DateTime, Local, Utc};
use tokio::sync::Mutex;

/// Default greeting, used for the "gm" reply, `/start`, and broadcasts.
pub const GREETING: &str = "GM";

const RECENT_MESSAGES_SHOWN: usize = 5;
const TOP_SENDERS_SHOWN: usize = 3;
const ACTIVE_WITHIN_SECS: i64 = 30;
const RECENT_WITHIN_SECS: i64 = 60;
const REGISTER_NAME_URL: &str = "https://www.base.org/names";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Stats,
    Report,
    Profile,
    Greeting,
}

impl Command {
    /// Case-insensitive, trimmed. Exact slash commands win over the "gm" substring match.
    pub fn parse(text: &str) -> Option<Self> {
        let t = text.trim().to_lowercase();
        match t.as_str() {
            "/start" => Some(Command::Start),
            "/stop" => Some(Command::Stop),
            "/status" => Some(Command::Status),
            "/stats" => Some(Command::Stats),
            "/report" => Some(Command::Report),
            "/profile" => Some(Command::Profile),
            _ if t.contains("gm") => Some(Command::Greeting),
            _ => None,
        }
    }
}

/// How recently the agent replied to a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    Active,
    Recent,
    Inactive,
}

impl Recency {
    pub fn classify(elapsed_secs: i64) -> Self {
        if elapsed_secs < ACTIVE_WITHIN_SECS {
            Recency::Active
        } else if elapsed_secs < RECENT_WITHIN_SECS {
            Recency::Recent
        } else {
            Recency::Inactive
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Recency::Active => "active",
            Recency::Recent => "recent",
            Recency::Inactive => "inactive",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Recency::Active => "🟢",
            Recency::Recent => "🟡",
            Recency::Inactive => "🔴",
        }
    }
}

/// "1h 5m ago", "2m 3s ago", "45s ago". Only the largest nonzero units.
pub fn format_time_ago(elapsed_secs: i64) -> String {
    let secs = elapsed_secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        if minutes > 0 {
            format!("{}h {}m ago", hours, minutes)
        } else {
            format!("{}h ago", hours)
        }
    } else if minutes > 0 {
        if seconds > 0 {
            format!("{}m {}s ago", minutes, seconds)
        } else {
            format!("{}m ago", minutes)
        }
    } else {
        format!("{}s ago", seconds)
    }
}

pub fn render_status(active: bool) -> String {
    if active {
        "📡 Broadcasting status: active".to_string()
    } else {
        "📡 Broadcasting status: inactive".to_string()
    }
}

/// Data behind `/stats`, with names already resolved.
#[derive(Debug, Clone)]
pub struct StatsView {
    pub total_messages: u64,
    pub unique_senders: usize,
    pub unique_inboxes: usize,
    pub broadcasting_active: bool,
    /// Newest first.
    pub recent: Vec<(String, DateTime<Utc>)>,
    pub top_senders: Vec<(String, u64)>,
}

pub fn render_stats(view: &StatsView) -> String {
    let mut out = String::from("📊 Agent stats\n\n");
    out.push_str(&format!("Total messages: {}\n", view.total_messages));
    out.push_str(&format!("Unique senders: {}\n", view.unique_senders));
    out.push_str(&format!("Unique inboxes: {}\n", view.unique_inboxes));
    out.push_str(&format!(
        "Broadcasting: {}\n",
        if view.broadcasting_active { "active" } else { "inactive" }
    ));

    out.push_str("\nRecent messages:\n");
    if view.recent.is_empty() {
        out.push_str("No messages yet\n");
    }
    for (name, at) in &view.recent {
        out.push_str(&format!(
            "• {} at {}\n",
            name,
            at.with_timezone(&Local).format("%H:%M:%S")
        ));
    }

    out.push_str("\nTop senders:\n");
    if view.top_senders.is_empty() {
        out.push_str("No senders yet\n");
    }
    for (i, (name, count)) in view.top_senders.iter().enumerate() {
        let noun = if *count == 1 { "message" } else { "messages" };
        out.push_str(&format!("{}. {}: {} {}\n", i + 1, name, count, noun));
    }
    out.trim_end().to_string()
}

/// One `/report` row.
#[derive(Debug, Clone)]
pub struct ReportLine {
    pub name: String,
    pub elapsed_secs: i64,
}

/// Rows must already be sorted by last response, most recent first.
pub fn render_report(lines: &[ReportLine]) -> String {
    if lines.is_empty() {
        return "📋 Response report\n\nNo responses recorded yet.".to_string();
    }
    let mut out = String::from("📋 Response report\n");
    for line in lines {
        let recency = Recency::classify(line.elapsed_secs);
        out.push_str(&format!(
            "\n{} {} ({}): {}",
            recency.glyph(),
            line.name,
            recency.label(),
            format_time_ago(line.elapsed_secs)
        ));
    }
    out
}

pub fn render_profile(address: &str, profile: Option<&Profile>) -> String {
    let Some(profile) = profile else {
        return format!(
            "👤 {}\n\nNo basename found for this address. Register one at {}",
            short_address(address),
            REGISTER_NAME_URL
        );
    };
    let mut out = format!("👤 {}\nAddress: {}", profile.name, address);
    if let Some(ref description) = profile.description {
        out.push_str(&format!("\n\n{}", description.trim()));
    }
    if !profile.links.is_empty() {
        out.push_str("\n\nLinks:");
        for link in &profile.links {
            out.push_str(&format!("\n• {}: {}", link.label, link.value));
        }
    }
    out
}

/// Who sent the command, and where to answer.
pub struct CommandContext<'a> {
    pub conversation: &'a dyn Conversation,
    pub resolver: &'a dyn NameResolver,
    pub sender_inbox_id: &'a str,
    pub sender_address: &'a str,
    pub greeting: &'a str,
}

/// Run one text command. Returns the command that matched, if any; unmatched text
/// produces no reply and no state change. The state lock is only held between
/// network calls.
pub async fn dispatch(
    text: &str,
    ctx: &CommandContext<'_>,
    state: &Mutex<SessionState>,
) -> Result<Option<Command>, ClientError> {
    let Some(command) = Command::parse(text) else {
        return Ok(None);
    };
    log::debug!(
        "command {:?} from {} in {}",
        command,
        ctx.sender_inbox_id,
        ctx.conversation.id()
    );
    match command {
        Command::Start => {
            ctx.conversation.send(ctx.greeting).await?;
            state.lock().await.broadcasting.start();
            log::info!("broadcasting started by {}", ctx.sender_inbox_id);
            ctx.conversation
                .send("✅ Broadcasting started. Active conversations will get a periodic GM.")
                .await?;
        }
        Command::Stop => {
            state.lock().await.broadcasting.stop();
            log::info!("broadcasting stopped by {}", ctx.sender_inbox_id);
            ctx.conversation.send("⏸️ Broadcasting stopped.").await?;
        }
        Command::Status => {
            let active = state.lock().await.broadcasting.is_active();
            ctx.conversation.send(&render_status(active)).await?;
        }
        Command::Stats => {
            let view = build_stats(state, ctx.resolver).await;
            ctx.conversation.send(&render_stats(&view)).await?;
        }
        Command::Report => {
            let lines = build_report(state, ctx.resolver, Utc::now()).await;
            ctx.conversation.send(&render_report(&lines)).await?;
        }
        Command::Profile => {
            let address = requester_address(ctx).await;
            let profile = ctx.resolver.resolve_profile(&address).await;
            ctx.conversation
                .send(&render_profile(&address, profile.as_ref()))
                .await?;
        }
        Command::Greeting => {
            ctx.conversation.send(ctx.greeting).await?;
        }
    }
    Ok(Some(command))
}

async fn build_stats(state: &Mutex<SessionState>, resolver: &dyn NameResolver) -> StatsView {
    let (mut view, recent_addresses, top_addresses) = {
        let state = state.lock().await;
        let recent: Vec<(String, DateTime<Utc>)> = state
            .recent_messages(RECENT_MESSAGES_SHOWN)
            .into_iter()
            .map(|r| (r.address.clone(), r.received_at))
            .collect();
        let view = StatsView {
            total_messages: state.total_messages(),
            unique_senders: state.unique_sender_count(),
            unique_inboxes: state.unique_inbox_count(),
            broadcasting_active: state.broadcasting.is_active(),
            recent: Vec::new(),
            top_senders: Vec::new(),
        };
        (view, recent, state.top_senders(TOP_SENDERS_SHOWN))
    };
    for (address, at) in recent_addresses {
        view.recent.push((display_name(resolver, &address).await, at));
    }
    for (address, count) in top_addresses {
        view.top_senders.push((display_name(resolver, &address).await, count));
    }
    view
}

async fn build_report(
    state: &Mutex<SessionState>,
    resolver: &dyn NameResolver,
    now: DateTime<Utc>,
) -> Vec<ReportLine> {
    let responses: Vec<(String, DateTime<Utc>)> = state
        .lock()
        .await
        .responses_by_recency()
        .into_iter()
        .map(|r| (r.address.clone(), r.last_response_at))
        .collect();
    let mut lines = Vec::with_capacity(responses.len());
    for (address, last_response_at) in responses {
        lines.push(ReportLine {
            name: display_name(resolver, &address).await,
            elapsed_secs: (now - last_response_at).num_seconds(),
        });
    }
    lines
}

/// Address of the requester as listed in the conversation's membership,
/// falling back to the address resolved at ingestion.
async fn requester_address(ctx: &CommandContext<'_>) -> String {
    match ctx.conversation.members().await {
        Ok(members) => members
            .into_iter()
            .find(|m| m.inbox_id.eq_ignore_ascii_case(ctx.sender_inbox_id))
            .and_then(|m| m.addresses.into_iter().next())
            .unwrap_or_else(|| ctx.sender_address.to_string()),
        Err(e) => {
            log::debug!("profile: member lookup failed, using sender address: {}", e);
            ctx.sender_address.to_string()
        }
    }
}
