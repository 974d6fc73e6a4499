//! Wallet identity for the messaging network: secp256k1 signer, derived EVM
//! address, and the database encryption key handed to the client on connect.

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("invalid secret key: {0}")]
    Key(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Network environment the client connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Dev,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Dev => "dev",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "dev" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(format!("unknown network environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn decode_hex_exact(input: &str, expected: usize) -> Result<Vec<u8>, IdentityError> {
    let trimmed = input.trim();
    let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(raw)?;
    if bytes.len() != expected {
        return Err(IdentityError::Length {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Wallet signer created from the agent's secret key.
pub struct Signer {
    key: SigningKey,
    address: String,
}

impl Signer {
    /// Parse a hex secret key (with or without `0x`) and derive its address.
    pub fn from_hex(secret: &str) -> Result<Self, IdentityError> {
        let bytes = decode_hex_exact(secret, 32)?;
        let key = SigningKey::from_slice(&bytes).map_err(|e| IdentityError::Key(e.to_string()))?;
        let address = address_from_key(&key);
        Ok(Self { key, address })
    }

    /// EIP-55 checksummed address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// EIP-191 personal_sign over `message`. Returns `0x` + r || s || v.
    pub fn sign_personal_message(&self, message: &str) -> Result<String, IdentityError> {
        let digest = personal_message_hash(message);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| IdentityError::Signing(e.to_string()))?;
        let mut out = signature.to_bytes().to_vec();
        out.push(recovery_id.to_byte() + 27);
        Ok(format!("0x{}", hex::encode(out)))
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// 32-byte key for the client's local database.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    pub fn from_hex(input: &str) -> Result<Self, IdentityError> {
        let bytes = decode_hex_exact(input, 32)?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// keccak256("\x19Ethereum Signed Message:\n" + len + message)
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

fn address_from_key(key: &SigningKey) -> String {
    let point = key.verifying_key().as_affine().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    to_checksum_address(&hex::encode(&hash[12..]))
}

/// EIP-55 mixed-case checksum for a 40-char hex address (prefix optional).
pub fn to_checksum_address(address: &str) -> String {
    let lower = address.trim().trim_start_matches("0x").to_ascii_lowercase();
    let hash = Keccak256::digest(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> if i % 2 == 0 { 4 } else { 0 }) & 0xf;
        if c.is_ascii_alphabetic() && nibble > 7 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
