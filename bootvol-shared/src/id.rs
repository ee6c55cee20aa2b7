//! External identifiers for provisioned volumes.
//!
//! An identifier is the host volume key joined to a freshness token:
//!
//! ```text
//! /var/lib/pools/default/node1;01HZX3T9Q4V6Y8B2C5D7E9F1GH
//! └──────── volume key ──────┘ └──────── ULID ──────────┘
//! ```
//!
//! The token is a ULID (26 chars, sortable by time). It never takes part in
//! lookups; it only keeps successive identifiers for the same volume apart.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

use crate::errors::{BootvolError, BootvolResult};

pub const DELIMITER: char = ';';

// Shared so tokens stay strictly increasing within a millisecond.
static TOKENS: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

fn fresh_token() -> Ulid {
    // Generator only fails when the random part overflows inside one
    // millisecond; a plain ULID is still unique enough there.
    TOKENS.lock().generate().unwrap_or_else(|_| Ulid::new())
}

/// Opaque handle returned to callers after provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalId {
    raw: String,
    split: usize,
}

impl ExternalId {
    /// Build a new identifier for `volume_key` with a fresh token.
    ///
    /// Keys containing [`DELIMITER`] are rejected, since parsing would cut
    /// them short.
    pub fn encode(volume_key: &str) -> BootvolResult<Self> {
        if volume_key.contains(DELIMITER) {
            return Err(BootvolError::UnencodableKey {
                key: volume_key.to_string(),
            });
        }
        let raw = format!("{}{}{}", volume_key, DELIMITER, fresh_token());
        Ok(Self {
            raw,
            split: volume_key.len(),
        })
    }

    /// Parse a previously issued identifier.
    ///
    /// Splits on the first delimiter only.
    pub fn parse(id: &str) -> BootvolResult<Self> {
        match id.find(DELIMITER) {
            Some(split) => Ok(Self {
                raw: id.to_string(),
                split,
            }),
            None => Err(BootvolError::InvalidIdentifier { id: id.to_string() }),
        }
    }

    /// Extract the volume key from an identifier string.
    pub fn decode(id: &str) -> BootvolResult<String> {
        Self::parse(id).map(|id| id.volume_key().to_string())
    }

    pub fn volume_key(&self) -> &str {
        &self.raw[..self.split]
    }

    pub fn token(&self) -> &str {
        &self.raw[self.split + DELIMITER.len_utf8()..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ExternalId {
    type Err = BootvolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ExternalId {
    type Error = BootvolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExternalId> for String {
    fn from(id: ExternalId) -> Self {
        id.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_recovers_key() {
        for key in ["abc123", "/var/lib/pools/default/node1", "k", "a:b/c d"] {
            let id = ExternalId::encode(key).unwrap();
            assert_eq!(ExternalId::decode(id.as_str()).unwrap(), key);
        }
    }

    #[test]
    fn test_encode_is_fresh_every_time() {
        let a = ExternalId::encode("abc123").unwrap();
        let b = ExternalId::encode("abc123").unwrap();
        assert_ne!(a, b);
        assert!(a.token() < b.token());
    }

    #[test]
    fn test_decode_without_delimiter_fails() {
        let err = ExternalId::decode("abc123").unwrap_err();
        assert!(matches!(err, BootvolError::InvalidIdentifier { ref id } if id == "abc123"));
    }

    #[test]
    fn test_key_with_delimiter_rejected() {
        let err = ExternalId::encode("po;ols/node1").unwrap_err();
        assert!(matches!(err, BootvolError::UnencodableKey { ref key } if key == "po;ols/node1"));
    }

    #[test]
    fn test_encoded_matches_parsed() {
        let id = ExternalId::encode("/var/lib/pools/default/node1").unwrap();
        assert_eq!(ExternalId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_split_on_first_delimiter_only() {
        let id = ExternalId::parse("abc;def;ghi").unwrap();
        assert_eq!(id.volume_key(), "abc");
        assert_eq!(id.token(), "def;ghi");

        // Empty segments are still two segments.
        let id = ExternalId::parse(";").unwrap();
        assert_eq!(id.volume_key(), "");
        assert_eq!(id.token(), "");
    }

    #[test]
    fn test_token_is_a_ulid() {
        let id = ExternalId::encode("abc123").unwrap();
        assert_eq!(id.token().len(), 26);
        assert!(Ulid::from_string(id.token()).is_ok());
    }

    #[test]
    fn test_serde_as_plain_string() {
        let id = ExternalId::encode("abc123").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: ExternalId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<ExternalId>("\"no-delimiter\"").is_err());
    }
}
