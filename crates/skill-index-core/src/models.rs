//! Core data models shared by the indexer and the search service.
//!
//! A [`Document`] is a single skill as held by the external document store.
//! The core only reads its content fields and writes back the
//! [`last_indexed_fingerprint`](Document::last_indexed_fingerprint) watermark
//! after a successful embedding.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::fingerprint::{fingerprint, indexable_text, Fingerprint};

/// A skill document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub description: String,
    pub body: String,
    /// Ordered so that the indexable text is deterministic.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Fingerprint of the content as of the last successful embedding.
    ///
    /// `None` means the document has never been embedded. The value is a
    /// watermark: it may be stale between an edit and the next indexing pass.
    #[serde(default)]
    pub last_indexed_fingerprint: Option<Fingerprint>,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: i64,
    /// Unix seconds.
    #[serde(default)]
    pub updated_at: i64,
}

impl Document {
    /// Build a never-indexed document with the given content.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            body: body.into(),
            tags: BTreeSet::new(),
            last_indexed_fingerprint: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// The text that is fingerprinted and sent to the embedding provider.
    pub fn indexable_text(&self) -> String {
        indexable_text(self)
    }

    /// Fingerprint of the current content.
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.indexable_text())
    }

    /// True when the watermark matches the current content.
    pub fn is_up_to_date(&self) -> bool {
        self.last_indexed_fingerprint.as_ref() == Some(&self.fingerprint())
    }
}

/// Which part of a document a hit matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchCategory {
    /// Matched on the title or tags.
    Title,
    /// Matched in the description or body, or only semantically.
    Content,
}

/// Which index produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Lexical,
    Semantic,
}

/// A single ranked hit in a [`SearchResultSet`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub match_category: MatchCategory,
    pub source: MatchSource,
    /// Highlighted excerpts. Always empty for title matches.
    pub snippets: Vec<String>,
    /// Ordering key from the originating index; only comparable within
    /// one source.
    pub score: f64,
}

/// Merged result of a hybrid search.
///
/// A document id appears at most once across both lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResultSet {
    pub title_matches: Vec<SearchHit>,
    pub content_matches: Vec<SearchHit>,
}

impl SearchResultSet {
    pub fn len(&self) -> usize {
        self.title_matches.len() + self.content_matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.title_matches.is_empty() && self.content_matches.is_empty()
    }

    /// All hits in rank order: title matches, then content matches.
    pub fn iter(&self) -> impl Iterator<Item = &SearchHit> {
        self.title_matches.iter().chain(self.content_matches.iter())
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.iter().any(|h| h.document_id == document_id)
    }

    pub fn document_ids(&self) -> Vec<&str> {
        self.iter().map(|h| h.document_id.as_str()).collect()
    }
}
