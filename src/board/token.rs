use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Longest UID an ISO 14443 tag can report (triple size).
pub const MAX_UID_LEN: usize = 10;

/// Identifier read from a physical piece's tag.
///
/// Stored inline so it is `Copy` and can be hashed without allocation. Two ids
/// are equal only when both length and bytes match.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId {
    len: u8,
    bytes: [u8; MAX_UID_LEN],
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("uid must be 1..={MAX_UID_LEN} bytes, got {0}")]
    Length(usize),
    #[error("uid is not valid hex: {0}")]
    Hex(String),
}

impl TokenId {
    pub fn from_bytes(raw: &[u8]) -> Result<Self, TokenError> {
        if raw.is_empty() || raw.len() > MAX_UID_LEN {
            return Err(TokenError::Length(raw.len()));
        }
        let mut bytes = [0u8; MAX_UID_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            len: raw.len() as u8,
            bytes,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.as_bytes())
    }
}

impl FromStr for TokenId {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim()).map_err(|e| TokenError::Hex(e.to_string()))?;
        TokenId::from_bytes(&raw)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.to_hex())
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
