//! Basename (ENS on Base) reverse resolution via JSON-RPC `eth_call`.
//!
//! Reverse node: namehash(`<addr>.<coinType>.reverse`) with
//! coinType = 0x80000000 | chainId. The L2 resolver answers `name(node)` and
//! `text(node, key)`.

use crate::names::{NameResolver, Profile, SocialLink};
use async_trait::async_trait;
use serde::Deserialize;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const BASE_MAINNET_CHAIN_ID: u64 = 8453;
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;

const BASE_MAINNET_RPC_URL: &str = "https://mainnet.base.org";
const BASE_SEPOLIA_RPC_URL: &str = "https://sepolia.base.org";
const BASE_MAINNET_L2_RESOLVER: &str = "0xC6d566A56A1aFf6508b41f6c90ff131615583BCD";
const BASE_SEPOLIA_L2_RESOLVER: &str = "0x6533C94869D28fAA8dF77cc63f9e2b2D6Cf77eBA";

/// name(bytes32)
const NAME_SELECTOR: &str = "691f3431";
/// text(bytes32,string)
const TEXT_SELECTOR: &str = "59d1d43c";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Text records rendered on a profile, with their display labels.
const PROFILE_LINK_KEYS: &[(&str, &str)] = &[
    ("url", "website"),
    ("com.twitter", "twitter"),
    ("com.github", "github"),
    ("xyz.farcaster", "farcaster"),
    ("org.telegram", "telegram"),
];

/// RPC endpoint, resolver contract, and cache lifetime.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub rpc_url: String,
    pub resolver_address: String,
    pub chain_id: u64,
    pub cache_ttl: Duration,
}

impl ResolverSettings {
    /// Known endpoints for Base mainnet and Base Sepolia; other chains fall back to mainnet.
    pub fn for_chain(chain_id: u64) -> Self {
        let (rpc_url, resolver_address) = if chain_id == BASE_SEPOLIA_CHAIN_ID {
            (BASE_SEPOLIA_RPC_URL, BASE_SEPOLIA_L2_RESOLVER)
        } else {
            (BASE_MAINNET_RPC_URL, BASE_MAINNET_L2_RESOLVER)
        };
        Self {
            rpc_url: rpc_url.to_string(),
            resolver_address: resolver_address.to_string(),
            chain_id,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

struct Cached<V> {
    value: V,
    at: Instant,
}

struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, Cached<V>>>,
}

impl<V: Clone> TtlCache<V> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, key: &str) -> Option<V> {
        let g = self.entries.read().await;
        g.get(key)
            .filter(|c| c.at.elapsed() < self.ttl)
            .map(|c| c.value.clone())
    }

    async fn insert(&self, key: String, value: V) {
        let mut g = self.entries.write().await;
        g.retain(|_, c| c.at.elapsed() < self.ttl);
        g.insert(
            key,
            Cached {
                value,
                at: Instant::now(),
            },
        );
    }
}

/// Resolves basenames and their text records, caching hits and misses.
pub struct BasenameResolver {
    settings: ResolverSettings,
    client: reqwest::Client,
    names: TtlCache<Option<String>>,
    profiles: TtlCache<Option<Profile>>,
}

impl BasenameResolver {
    pub fn new(settings: ResolverSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(RPC_TIMEOUT).build()?;
        let ttl = settings.cache_ttl;
        Ok(Self {
            settings,
            client,
            names: TtlCache::new(ttl),
            profiles: TtlCache::new(ttl),
        })
    }

    async fn eth_call(&self, data: String) -> Result<Vec<u8>, String> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": self.settings.resolver_address, "data": data }, "latest"],
        });
        let res = self
            .client
            .post(&self.settings.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("eth_call failed: {} {}", status, body));
        }
        let data: RpcResponse = res.json().await.map_err(|e| e.to_string())?;
        if let Some(err) = data.error {
            return Err(format!("eth_call error: {}", err.message));
        }
        let result = data.result.unwrap_or_default();
        hex::decode(result.trim_start_matches("0x")).map_err(|e| e.to_string())
    }

    async fn lookup_name(&self, node: &[u8; 32]) -> Result<Option<String>, String> {
        let data = format!("0x{}{}", NAME_SELECTOR, hex::encode(node));
        let out = self.eth_call(data).await?;
        Ok(decode_abi_string(&out).filter(|s| !s.is_empty()))
    }

    async fn lookup_text(&self, node: &[u8; 32], key: &str) -> Result<Option<String>, String> {
        let out = self.eth_call(encode_text_call(node, key)).await?;
        Ok(decode_abi_string(&out).filter(|s| !s.trim().is_empty()))
    }

    async fn fetch_profile(&self, address: &str) -> Result<Option<Profile>, String> {
        let node = reverse_node(address, self.settings.chain_id);
        let Some(name) = self.lookup_name(&node).await? else {
            return Ok(None);
        };
        // Text records live on the forward node of the name.
        let forward = namehash(&name);
        let description = self.lookup_text(&forward, "description").await?;
        let mut links = Vec::new();
        for (key, label) in PROFILE_LINK_KEYS {
            if let Some(value) = self.lookup_text(&forward, key).await? {
                links.push(SocialLink {
                    label: label.to_string(),
                    value,
                });
            }
        }
        Ok(Some(Profile {
            name,
            description,
            links,
        }))
    }
}

#[async_trait]
impl NameResolver for BasenameResolver {
    async fn resolve_display_name(&self, address: &str) -> Option<String> {
        let key = address.trim().to_ascii_lowercase();
        if let Some(cached) = self.names.get(&key).await {
            return cached;
        }
        let node = reverse_node(&key, self.settings.chain_id);
        let name = match self.lookup_name(&node).await {
            Ok(name) => name,
            Err(e) => {
                log::debug!("basename lookup for {} failed: {}", key, e);
                None
            }
        };
        self.names.insert(key, name.clone()).await;
        name
    }

    async fn resolve_profile(&self, address: &str) -> Option<Profile> {
        let key = address.trim().to_ascii_lowercase();
        if let Some(cached) = self.profiles.get(&key).await {
            return cached;
        }
        let profile = match self.fetch_profile(&key).await {
            Ok(p) => p,
            Err(e) => {
                log::debug!("basename profile for {} failed: {}", key, e);
                None
            }
        };
        if let Some(ref p) = profile {
            self.names.insert(key.clone(), Some(p.name.clone())).await;
        }
        self.profiles.insert(key, profile.clone()).await;
        profile
    }
}

/// ENS namehash.
pub fn namehash(name: &str) -> [u8; 32] {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = Keccak256::digest(label.as_bytes());
        let mut hasher = Keccak256::new();
        hasher.update(node);
        hasher.update(label_hash);
        node = hasher.finalize().into();
    }
    node
}

/// ENSIP-11 coin type for an EVM chain, as uppercase hex.
pub fn coin_type_hex(chain_id: u64) -> String {
    format!("{:X}", 0x8000_0000u64 | chain_id)
}

/// Reverse-record node for an address on the given chain.
pub fn reverse_node(address: &str, chain_id: u64) -> [u8; 32] {
    let addr = address.trim().trim_start_matches("0x").to_ascii_lowercase();
    namehash(&format!("{}.{}.reverse", addr, coin_type_hex(chain_id)))
}

fn encode_text_call(node: &[u8; 32], key: &str) -> String {
    let mut data = Vec::with_capacity(4 * 32 + key.len());
    data.extend_from_slice(node);
    data.extend_from_slice(&abi_word(0x40));
    data.extend_from_slice(&abi_word(key.len() as u64));
    data.extend_from_slice(key.as_bytes());
    let pad = (32 - key.len() % 32) % 32;
    data.extend(std::iter::repeat(0u8).take(pad));
    format!("0x{}{}", TEXT_SELECTOR, hex::encode(data))
}

fn abi_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn read_word(data: &[u8], at: usize) -> Option<usize> {
    let word = data.get(at..at.checked_add(32)?)?;
    if word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(buf)).ok()
}

/// Decode an ABI-encoded dynamic `string` return value.
fn decode_abi_string(data: &[u8]) -> Option<String> {
    let offset = read_word(data, 0)?;
    let len = read_word(data, offset)?;
    let start = offset.checked_add(32)?;
    let bytes = data.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}
