//! Replaceable-record addresses
//!
//! Exercise definitions and workout templates are addressed by the triple
//! `kind:pubkey:identifier`. The triple is the stable reference stored on
//! exercise slots and written into workout records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AddressError;

/// Kind of an exercise definition record
pub const EXERCISE_KIND: u32 = 33401;

/// Kind of a workout template record
pub const TEMPLATE_KIND: u32 = 33402;

/// Kind of a completed workout record
pub const WORKOUT_RECORD_KIND: u32 = 1301;

/// A `kind:pubkey:identifier` reference to a replaceable record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub kind: u32,
    pub pubkey: String,
    pub identifier: String,
}

impl Address {
    /// Create an address from its parts
    pub fn new(kind: u32, pubkey: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            pubkey: pubkey.into(),
            identifier: identifier.into(),
        }
    }

    /// Address of an exercise definition
    pub fn exercise(pubkey: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::new(EXERCISE_KIND, pubkey, identifier)
    }

    /// Address of a workout template
    pub fn template(pubkey: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::new(TEMPLATE_KIND, pubkey, identifier)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.pubkey, self.identifier)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Identifiers may themselves contain ':'
        let mut parts = s.splitn(3, ':');
        let (kind, pubkey, identifier) = match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(p), Some(i)) => (k, p, i),
            _ => return Err(AddressError::WrongShape(s.to_string())),
        };

        let kind = kind
            .parse::<u32>()
            .map_err(|_| AddressError::InvalidKind(s.to_string()))?;

        if pubkey.is_empty() {
            return Err(AddressError::EmptyPubkey(s.to_string()));
        }
        if identifier.is_empty() {
            return Err(AddressError::EmptyIdentifier(s.to_string()));
        }

        Ok(Self::new(kind, pubkey, identifier))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
