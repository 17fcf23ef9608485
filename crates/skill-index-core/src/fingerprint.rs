//! Content fingerprinting for change detection.
//!
//! A [`Fingerprint`] is the SHA-256 digest of a document's indexable text,
//! rendered as lowercase hex. It answers one question: has this document's
//! content changed since it was last embedded? Two documents with identical
//! text share a fingerprint, which is fine because comparison is always per
//! document id.
//!
//! # Indexable text
//!
//! Built in a fixed order, one field per line:
//!
//! ```text
//! <title>
//! <description>
//! <tag-a>, <tag-b>, ...
//!
//! <body>
//! ```
//!
//! Each field is trimmed and CRLF line endings are normalized to LF. Tags are
//! lowercased, trimmed, deduplicated, and sorted, so tag order and casing do
//! not cause re-embedding.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::Document;

/// Lowercase hex SHA-256 content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse a stored hex digest.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is exactly 64 hex characters.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("invalid fingerprint: expected 64 hex characters, got {:?}", hex);
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash arbitrary indexable text.
pub fn fingerprint(text: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Build the normalized text used for both fingerprinting and embedding.
pub fn indexable_text(doc: &Document) -> String {
    let tags = normalize_tags(&doc.tags);
    let mut out = String::with_capacity(
        doc.title.len() + doc.description.len() + doc.body.len() + tags.len() + 4,
    );
    out.push_str(&normalize_field(&doc.title));
    out.push('\n');
    out.push_str(&normalize_field(&doc.description));
    out.push('\n');
    out.push_str(&tags);
    out.push_str("\n\n");
    out.push_str(&normalize_field(&doc.body));
    out
}

fn normalize_field(s: &str) -> String {
    s.replace("\r\n", "\n").trim().to_string()
}

fn normalize_tags(tags: &BTreeSet<String>) -> String {
    let normalized: BTreeSet<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    normalized.into_iter().collect::<Vec<_>>().join(", ")
}
