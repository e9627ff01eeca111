//! Document identifiers.
//!
//! Every stored document is keyed by a 12-byte object id: a big-endian
//! seconds timestamp, five random bytes and a three-byte counter. The store
//! keeps the raw bytes; the wire form is 24 lowercase hex characters.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of a native identifier in bytes.
pub const ID_LEN: usize = 12;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// A caller-supplied or stored value that is not a valid identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier: {value:?}")]
pub struct InvalidIdentifier {
    pub value: String,
}

/// Native document identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId([u8; ID_LEN]);

impl DocId {
    /// Generate a fresh identifier stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timestamp(Utc::now())
    }

    /// Generate a fresh identifier stamped with `at` (second precision).
    #[must_use]
    pub fn with_timestamp(at: DateTime<Utc>) -> Self {
        let secs = at.timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        let random: [u8; 5] = rand::random();
        let count = COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; ID_LEN];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&random);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Build an identifier from a stored byte value.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] if `bytes` is not exactly [`ID_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidIdentifier> {
        <[u8; ID_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| InvalidIdentifier {
                value: hex::encode(bytes),
            })
    }

    /// Parse the canonical string form. Upper- and lowercase hex are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] unless `s` is 24 hex characters.
    pub fn parse_str(s: &str) -> Result<Self, InvalidIdentifier> {
        let invalid = || InvalidIdentifier {
            value: s.to_string(),
        };
        if s.len() != ID_LEN * 2 {
            return Err(invalid());
        }
        let mut bytes = [0u8; ID_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }

    /// Canonical string form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Creation time embedded in the identifier.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(i64::from(secs), 0)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl Default for DocId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocId({})", self.to_hex())
    }
}

impl FromStr for DocId {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for DocId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DocId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_str(&s).map_err(de::Error::custom)
    }
}
