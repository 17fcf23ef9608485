//! In-memory collaborators for tests and embedding in other programs.
//!
//! - [`InMemoryStore`] implements [`DocumentStore`] and a substring-based
//!   [`LexicalIndex`] over a `BTreeMap` keyed by document id.
//! - [`InMemoryVectorIndex`] implements [`VectorIndex`] with brute-force
//!   cosine similarity, embedding through any [`EmbeddingProvider`].
//!
//! Both use `std::sync::RwLock`; no lock is held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::fingerprint::Fingerprint;
use crate::models::{Document, MatchCategory};
use crate::snippet::query_terms;

use super::{DocumentError, DocumentStore, LexicalHit, LexicalIndex, UpsertReport, VectorHit, VectorIndex};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

/// Document store and lexical index held in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<BTreeMap<String, Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.docs.write() {
            for doc in docs {
                map.insert(doc.id.clone(), doc);
            }
        }
        store
    }

    /// Store `doc` exactly as given, watermark included.
    pub fn insert(&self, doc: Document) -> Result<()> {
        write(&self.docs)?.insert(doc.id.clone(), doc);
        Ok(())
    }

    /// Insert or update content, keeping the stored watermark only while it
    /// still matches the new content.
    pub fn upsert_document(&self, doc: &Document) -> Result<()> {
        let mut docs = write(&self.docs)?;
        let current = doc.fingerprint();
        let watermark = docs
            .get(&doc.id)
            .and_then(|d| d.last_indexed_fingerprint.clone())
            .or_else(|| doc.last_indexed_fingerprint.clone())
            .filter(|fp| *fp == current);
        let mut stored = doc.clone();
        stored.last_indexed_fingerprint = watermark;
        stored.updated_at = chrono::Utc::now().timestamp();
        docs.insert(stored.id.clone(), stored);
        Ok(())
    }

    pub fn delete_document(&self, document_id: &str) -> Result<bool> {
        Ok(write(&self.docs)?.remove(document_id).is_some())
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list_all(&self, page_size: usize, offset: usize) -> Result<Vec<Document>> {
        Ok(read(&self.docs)?
            .values()
            .skip(offset)
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn list_without_fingerprint(&self, limit: usize) -> Result<Vec<Document>> {
        Ok(read(&self.docs)?
            .values()
            .filter(|d| d.last_indexed_fingerprint.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_without_fingerprint(&self) -> Result<u64> {
        Ok(read(&self.docs)?
            .values()
            .filter(|d| d.last_indexed_fingerprint.is_none())
            .count() as u64)
    }

    async fn update_fingerprint(&self, document_id: &str, fingerprint: &Fingerprint) -> Result<()> {
        let mut docs = write(&self.docs)?;
        let doc = docs
            .get_mut(document_id)
            .ok_or_else(|| anyhow!("document not found: {}", document_id))?;
        if doc.fingerprint() != *fingerprint {
            bail!("document changed since it was loaded: {}", document_id);
        }
        doc.last_indexed_fingerprint = Some(fingerprint.clone());
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        Ok(read(&self.docs)?.get(document_id).cloned())
    }
}

/// Case-insensitive term matching: a term found in the title or tags makes
/// a title hit; otherwise a term found in the description or body makes a
/// content hit. Score is the number of distinct terms matched. Content hits
/// carry no snippet.
#[async_trait]
impl LexicalIndex for InMemoryStore {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let terms = query_terms(text);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let docs = read(&self.docs)?;
        let mut title_hits = Vec::new();
        let mut content_hits = Vec::new();

        for doc in docs.values() {
            let heading = format!(
                "{} {}",
                doc.title.to_lowercase(),
                doc.tags.iter().map(|t| t.to_lowercase()).collect::<Vec<_>>().join(" ")
            );
            let title_score = terms.iter().filter(|t| heading.contains(t.as_str())).count();
            if title_score > 0 {
                title_hits.push(LexicalHit {
                    document_id: doc.id.clone(),
                    category: MatchCategory::Title,
                    snippet: None,
                    score: title_score as f64,
                });
                continue;
            }

            let content = format!("{} {}", doc.description, doc.body).to_lowercase();
            let content_score = terms.iter().filter(|t| content.contains(t.as_str())).count();
            if content_score > 0 {
                content_hits.push(LexicalHit {
                    document_id: doc.id.clone(),
                    category: MatchCategory::Content,
                    snippet: None,
                    score: content_score as f64,
                });
            }
        }

        let by_score = |a: &LexicalHit, b: &LexicalHit| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        };
        title_hits.sort_by(by_score);
        content_hits.sort_by(by_score);

        let mut hits = title_hits;
        hits.extend(content_hits);
        hits.truncate(limit);
        Ok(hits)
    }
}

struct StoredVector {
    vector: Vec<f32>,
    summary: Option<String>,
}

/// Brute-force vector index held in process memory.
pub struct InMemoryVectorIndex {
    provider: Arc<dyn EmbeddingProvider>,
    vectors: RwLock<HashMap<String, StoredVector>>,
}

impl InMemoryVectorIndex {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            vectors: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.vectors
            .read()
            .map(|v| v.contains_key(document_id))
            .unwrap_or(false)
    }

    pub fn remove(&self, document_id: &str) -> Result<bool> {
        Ok(write(&self.vectors)?.remove(document_id).is_some())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert_batch(&self, documents: &[Document]) -> Result<UpsertReport> {
        if documents.is_empty() {
            return Ok(UpsertReport::default());
        }

        let texts: Vec<String> = documents.iter().map(Document::indexable_text).collect();
        let embedded = self.provider.embed_batch(&texts).await?;
        let dims = self.provider.dims();

        let mut report = UpsertReport::default();
        let mut vectors = write(&self.vectors)?;
        for (i, doc) in documents.iter().enumerate() {
            match embedded.get(i) {
                Some(v) if dims == 0 || v.len() == dims => {
                    vectors.insert(
                        doc.id.clone(),
                        StoredVector {
                            vector: v.clone(),
                            summary: Some(doc.description.clone()).filter(|s| !s.is_empty()),
                        },
                    );
                    report.succeeded.push(doc.id.clone());
                }
                Some(v) => report.errors.push(DocumentError::new(
                    &doc.id,
                    format!("expected {} dimensions, got {}", dims, v.len()),
                )),
                None => report
                    .errors
                    .push(DocumentError::new(&doc.id, "provider returned no vector")),
            }
        }
        Ok(report)
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<VectorHit>> {
        let vectors = read(&self.vectors)?;
        let mut hits: Vec<VectorHit> = vectors
            .iter()
            .map(|(id, stored)| VectorHit {
                document_id: id.clone(),
                score: cosine_similarity(vector, &stored.vector),
                summary: stored.summary.clone(),
            })
            .filter(|h| h.score >= similarity_threshold)
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn is_available(&self) -> bool {
        !self.is_empty()
    }
}
