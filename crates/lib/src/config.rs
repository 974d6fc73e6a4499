//! Configuration types and loading.
//!
//! Optional settings come from a JSON file (e.g. `~/.gmbot/config.json`) and
//! environment overrides. The four network credentials are required and come
//! from the process environment, with a `.env` file as fallback.

use crate::commands::GREETING;
use crate::identity::Environment;
use crate::names::ResolverSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const WALLET_KEY_VAR: &str = "WALLET_KEY";
pub const ENCRYPTION_KEY_VAR: &str = "ENCRYPTION_KEY";
pub const NETWORK_ENV_VAR: &str = "XMTP_ENV";
pub const NETWORK_ID_VAR: &str = "NETWORK_ID";

const REQUIRED_VARS: [&str; 4] = [WALLET_KEY_VAR, ENCRYPTION_KEY_VAR, NETWORK_ENV_VAR, NETWORK_ID_VAR];

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Messaging bridge endpoint.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Periodic greeting settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Name resolution (basenames) settings.
    #[serde(default)]
    pub names: NamesConfig,

    /// In-memory message history.
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Base URL of the bridge daemon. Overridden by GMBOT_BRIDGE_URL env.
    #[serde(default = "default_bridge_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastConfig {
    /// Seconds between broadcast ticks (default 30).
    #[serde(default = "default_broadcast_interval_secs")]
    pub interval_secs: u64,

    /// Whether broadcasting is on before anyone sends /start (default true).
    #[serde(default = "default_true")]
    pub start_active: bool,

    /// Payload sent on each tick: a greeting and an optional follow-up. Extra entries are ignored.
    #[serde(default = "default_broadcast_messages")]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamesConfig {
    /// JSON-RPC endpoint. Defaults to the public endpoint for NETWORK_ID.
    pub rpc_url: Option<String>,
    /// L2 resolver contract. Defaults to the known resolver for NETWORK_ID.
    pub resolver_address: Option<String>,
    /// Lifetime of cached lookups, hits and misses alike (default 300).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Max message records kept; oldest are evicted first. 0 = unbounded.
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:5555".to_string()
}

fn default_broadcast_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_broadcast_messages() -> Vec<String> {
    vec![GREETING.to_string()]
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_history_limit() -> usize {
    10_000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_broadcast_interval_secs(),
            start_active: true,
            messages: default_broadcast_messages(),
        }
    }
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            resolver_address: None,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

impl BroadcastConfig {
    /// Tick period; never zero.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Non-empty payload entries, at most two; falls back to the default greeting.
    pub fn payload(&self) -> Vec<String> {
        let messages: Vec<String> = self
            .messages
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .take(2)
            .map(str::to_string)
            .collect();
        if messages.is_empty() {
            default_broadcast_messages()
        } else {
            messages
        }
    }
}

/// Resolve the bridge URL: env GMBOT_BRIDGE_URL overrides config.
pub fn resolve_bridge_url(config: &Config) -> String {
    std::env::var("GMBOT_BRIDGE_URL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| config.bridge.url.trim().to_string())
}

/// Resolver endpoints for the given chain, with config overrides applied.
pub fn resolver_settings(config: &Config, chain_id: u64) -> ResolverSettings {
    let mut settings = ResolverSettings::for_chain(chain_id);
    if let Some(url) = config.names.rpc_url.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        settings.rpc_url = url.to_string();
    }
    if let Some(addr) = config
        .names
        .resolver_address
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        settings.resolver_address = addr.to_string();
    }
    settings.cache_ttl = Duration::from_secs(config.names.cache_ttl_secs);
    settings
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("GMBOT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".gmbot").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or GMBOT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Required network credentials.
#[derive(Clone)]
pub struct Credentials {
    pub wallet_key: String,
    pub encryption_key: String,
    pub env: Environment,
    /// Chain id used for name resolution (e.g. 8453 for Base).
    pub network_id: u64,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("env", &self.env)
            .field("network_id", &self.network_id)
            .finish_non_exhaustive()
    }
}

/// Read credentials from the process environment, filling gaps from `env_file`.
/// The process environment is never modified.
pub fn load_credentials(env_file: &Path) -> Result<Credentials> {
    let missing_from_env = REQUIRED_VARS.iter().any(|k| env_value(k).is_none());
    let fallback = if missing_from_env {
        read_env_file(env_file)?
    } else {
        HashMap::new()
    };
    resolve_credentials(env_value, &fallback)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        log::debug!("env file not found: {}", path.display());
        return Ok(HashMap::new());
    }
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("reading env file {}", path.display()))?;
    let mut vars = HashMap::new();
    for item in iter {
        let (k, v) = item.with_context(|| format!("parsing env file {}", path.display()))?;
        vars.insert(k, v);
    }
    Ok(vars)
}

/// Resolve each required key from `lookup` first, then `fallback`. Blank values count as missing.
pub fn resolve_credentials(
    lookup: impl Fn(&str) -> Option<String>,
    fallback: &HashMap<String, String>,
) -> Result<Credentials> {
    let get = |key: &str| {
        lookup(key)
            .or_else(|| fallback.get(key).cloned())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let missing: Vec<&str> = REQUIRED_VARS
        .iter()
        .copied()
        .filter(|k| get(*k).is_none())
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("missing required settings: {}", missing.join(", "));
    }
    let value = |key: &str| get(key).unwrap_or_default();
    let env: Environment = value(NETWORK_ENV_VAR)
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{}: {}", NETWORK_ENV_VAR, e))?;
    let network_id: u64 = value(NETWORK_ID_VAR)
        .parse()
        .with_context(|| format!("{} must be a number", NETWORK_ID_VAR))?;
    Ok(Credentials {
        wallet_key: value(WALLET_KEY_VAR),
        encryption_key: value(ENCRYPTION_KEY_VAR),
        env,
        network_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.bridge.url, "http://127.0.0.1:5555");
        assert_eq!(c.broadcast.interval(), Duration::from_secs(30));
        assert!(c.broadcast.start_active);
        assert_eq!(c.broadcast.payload(), vec!["GM".to_string()]);
        assert_eq!(c.history.limit, 10_000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: Config =
            serde_json::from_str(r#"{"broadcast":{"intervalSecs":120,"messages":["GM"," ","wagmi","extra"]}}"#)
                .unwrap();
        assert_eq!(c.broadcast.interval(), Duration::from_secs(120));
        assert!(c.broadcast.start_active);
        assert_eq!(c.broadcast.payload(), vec!["GM".to_string(), "wagmi".to_string()]);
        assert_eq!(c.names.cache_ttl_secs, 300);
    }

    #[test]
    fn env_wins_over_file() {
        let env = vars(&[(WALLET_KEY_VAR, "0xenv")]);
        let file = vars(&[
            (WALLET_KEY_VAR, "0xfile"),
            (ENCRYPTION_KEY_VAR, "abcd"),
            (NETWORK_ENV_VAR, "dev"),
            (NETWORK_ID_VAR, "8453"),
        ]);
        let creds = resolve_credentials(|k| env.get(k).cloned(), &file).unwrap();
        assert_eq!(creds.wallet_key, "0xenv");
        assert_eq!(creds.encryption_key, "abcd");
        assert_eq!(creds.env, Environment::Dev);
        assert_eq!(creds.network_id, 8453);
    }

    #[test]
    fn missing_settings_are_named() {
        let file = vars(&[(WALLET_KEY_VAR, "0xfile"), (NETWORK_ENV_VAR, "  ")]);
        let err = resolve_credentials(|_| None, &file).unwrap_err().to_string();
        assert!(err.contains(ENCRYPTION_KEY_VAR));
        assert!(err.contains(NETWORK_ENV_VAR));
        assert!(err.contains(NETWORK_ID_VAR));
        assert!(!err.contains(WALLET_KEY_VAR));
    }

    #[test]
    fn network_id_must_be_numeric() {
        let file = vars(&[
            (WALLET_KEY_VAR, "k"),
            (ENCRYPTION_KEY_VAR, "e"),
            (NETWORK_ENV_VAR, "production"),
            (NETWORK_ID_VAR, "base"),
        ]);
        assert!(resolve_credentials(|_| None, &file).is_err());
    }

    #[test]
    fn resolver_overrides_apply() {
        let mut c = Config::default();
        c.names.rpc_url = Some("http://localhost:8545".to_string());
        c.names.cache_ttl_secs = 5;
        let s = resolver_settings(&c, 84532);
        assert_eq!(s.rpc_url, "http://localhost:8545");
        assert_eq!(s.chain_id, 84532);
        assert_eq!(s.cache_ttl, Duration::from_secs(5));
    }

    #[test]
    fn reads_env_file_without_touching_process_env() {
        let dir = std::env::temp_dir().join(format!("gmbot-config-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(".env");
        std::fs::write(&path, "NETWORK_ID=84532\nXMTP_ENV=dev\n").unwrap();
        let vars = read_env_file(&path).unwrap();
        assert_eq!(vars.get(NETWORK_ID_VAR).map(String::as_str), Some("84532"));
        assert!(read_env_file(&dir.join("missing.env")).unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
