//! Human-readable names for wallet addresses.
//!
//! The agent only sees the `NameResolver` trait; `BasenameResolver` is the
//! on-chain implementation.

mod basename;

pub use basename::{
    BasenameResolver, ResolverSettings, BASE_MAINNET_CHAIN_ID, BASE_SEPOLIA_CHAIN_ID,
};

use async_trait::async_trait;

/// Public profile attached to a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub description: Option<String>,
    pub links: Vec<SocialLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialLink {
    pub label: String,
    pub value: String,
}

/// Address -> name lookup. Implementations own their caching; failures
/// are reported as "not found".
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_display_name(&self, address: &str) -> Option<String>;

    async fn resolve_profile(&self, address: &str) -> Option<Profile>;
}

/// `0x1234ab...abcdef`: first 8 and last 6 characters.
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 14 {
        return address.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Resolved name, or the shortened address when there is none.
pub async fn display_name(resolver: &dyn NameResolver, address: &str) -> String {
    match resolver.resolve_display_name(address).await {
        Some(name) if !name.trim().is_empty() => name,
        _ => short_address(address),
    }
}
