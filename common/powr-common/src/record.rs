//! Append-only record shape
//!
//! Every record is a kind, an author, a timestamp, an ordered list of string
//! tuples (tags) and free-form content. The canonical id is the SHA-256 of the
//! compact JSON array `[0, pubkey, created_at, kind, tags, content]`, so two
//! records with the same logical content always share an id.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::error::RecordError;

/// One ordered tag tuple, e.g. `["title", "Leg Day"]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a tag from any sequence of string-ish values
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Tag name (first element)
    pub fn name(&self) -> &str {
        self.get(0).unwrap_or("")
    }

    /// Tag value (second element)
    pub fn value(&self) -> Option<&str> {
        self.get(1)
    }

    /// Element at position `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Element at `index`, treating a missing or empty element as absent
    pub fn non_empty(&self, index: usize) -> Option<&str> {
        self.get(index).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A record before signing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedRecord {
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub content: String,
}

impl UnsignedRecord {
    /// Create an empty record of the given kind
    pub fn new(kind: u32, pubkey: impl Into<String>, created_at: i64) -> Self {
        Self {
            pubkey: pubkey.into(),
            created_at,
            kind,
            tags: Vec::new(),
            content: String::new(),
        }
    }

    /// Append a tag
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Canonical id: lowercase hex SHA-256 of the serialized commitment array
    pub fn canonical_id(&self) -> String {
        let commitment = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ]);
        let mut hasher = Sha256::new();
        hasher.update(commitment.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// First tag with the given name
    pub fn first_tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name() == name)
    }

    /// All tags with the given name, in order
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        self.tags.iter().filter(move |t| t.name() == name)
    }

    /// Value of the first tag with the given name
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.first_tag(name).and_then(Tag::value)
    }

    /// Address of a replaceable record (`kind:pubkey:d`)
    pub fn address(&self) -> Option<Address> {
        self.tag_value("d")
            .map(|d| Address::new(self.kind, self.pubkey.clone(), d))
    }

    /// Fail unless the record is of the expected kind
    pub fn expect_kind(&self, expected: u32) -> Result<(), RecordError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(RecordError::WrongKind {
                expected,
                found: self.kind,
            })
        }
    }
}

/// A record with its id, as held by an event store or written to an outbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub body: UnsignedRecord,
}

impl Record {
    /// Stamp an unsigned record with its canonical id
    pub fn from_unsigned(body: UnsignedRecord) -> Self {
        Self {
            id: body.canonical_id(),
            body,
        }
    }
}
