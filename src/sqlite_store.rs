//! SQLite-backed collaborators.
//!
//! [`SqliteStore`] implements [`DocumentStore`] and an FTS5 [`LexicalIndex`]
//! over the `skills` / `skills_fts` tables. [`SqliteVectorIndex`] implements
//! [`VectorIndex`] over `skill_vectors`, embedding through whichever
//! [`EmbeddingProvider`] it was built with.
//!
//! Both share one [`SqlitePool`]. The pool runs in WAL mode (see
//! [`crate::db`]), so the indexer's writes do not block concurrent searches.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use skill_index_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use skill_index_core::fingerprint::Fingerprint;
use skill_index_core::models::{Document, MatchCategory};
use skill_index_core::snippet::{query_terms, ELLIPSIS, HIGHLIGHT_CLOSE, HIGHLIGHT_OPEN};
use skill_index_core::store::{
    DocumentError, DocumentStore, LexicalHit, LexicalIndex, UpsertReport, VectorHit, VectorIndex,
};

/// Tokens of context FTS5 keeps around a highlighted match.
const SNIPPET_TOKENS: i64 = 16;

const SKILL_COLUMNS: &str =
    "id, title, description, body, tags_json, indexed_fingerprint, created_at, updated_at";

/// Document store and lexical index on SQLite.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update a skill and its FTS row.
    ///
    /// The stored watermark survives only while it still matches the new
    /// content, so an edited skill shows up in
    /// [`DocumentStore::list_without_fingerprint`] again.
    pub async fn upsert_document(&self, doc: &Document) -> Result<()> {
        let current = doc.fingerprint();
        let tags_json = serde_json::to_string(&doc.tags)?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        let existing: Option<Option<String>> =
            sqlx::query_scalar("SELECT indexed_fingerprint FROM skills WHERE id = ?")
                .bind(&doc.id)
                .fetch_optional(&mut *tx)
                .await?;

        let watermark = match existing {
            Some(stored) => stored.and_then(|hex| Fingerprint::from_hex(&hex).ok()),
            None => doc.last_indexed_fingerprint.clone(),
        }
        .filter(|fp| *fp == current);

        sqlx::query(
            r#"
            INSERT INTO skills (id, title, description, body, tags_json,
                                indexed_fingerprint, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                body = excluded.body,
                tags_json = excluded.tags_json,
                indexed_fingerprint = excluded.indexed_fingerprint,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.description)
        .bind(&doc.body)
        .bind(&tags_json)
        .bind(watermark.as_ref().map(|fp| fp.as_str()))
        .bind(if doc.created_at > 0 { doc.created_at } else { now })
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM skills_fts WHERE skill_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;

        let tags = doc.tags.iter().cloned().collect::<Vec<_>>().join(" ");
        sqlx::query(
            "INSERT INTO skills_fts (skill_id, title, tags, description, body) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&tags)
        .bind(&doc.description)
        .bind(&doc.body)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .with_context(|| format!("Failed to store skill {}", doc.id))?;
        Ok(())
    }

    /// Remove a skill with its FTS row and vector. Returns whether it existed.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM skill_vectors WHERE skill_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM skills_fts WHERE skill_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM skills WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn fts_hits(&self, expression: &str, limit: usize) -> Result<Vec<SqliteRow>> {
        let rows = sqlx::query(
            r#"
            SELECT skill_id, rank,
                   snippet(skills_fts, -1, ?, ?, ?, ?) AS snippet
            FROM skills_fts
            WHERE skills_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(HIGHLIGHT_OPEN)
        .bind(HIGHLIGHT_CLOSE)
        .bind(ELLIPSIS)
        .bind(SNIPPET_TOKENS)
        .bind(expression)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn row_to_document(row: &SqliteRow) -> Document {
    let tags_json: String = row.get("tags_json");
    let watermark: Option<String> = row.get("indexed_fingerprint");
    Document {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        body: row.get("body"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        last_indexed_fingerprint: watermark.and_then(|hex| Fingerprint::from_hex(&hex).ok()),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Build an FTS5 expression matching any query term as a prefix.
///
/// Every term is double-quoted, so FTS5 operators typed by the user are
/// searched as text. Returns `None` when the query has no usable terms.
pub fn fts_expression(text: &str) -> Option<String> {
    let terms: Vec<String> = query_terms(text)
        .iter()
        .map(|t| format!("\"{}\"*", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(format!("({})", terms.join(" OR ")))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn list_all(&self, page_size: usize, offset: usize) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM skills ORDER BY id LIMIT ? OFFSET ?",
            SKILL_COLUMNS
        ))
        .bind(page_size as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn list_without_fingerprint(&self, limit: usize) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM skills WHERE indexed_fingerprint IS NULL ORDER BY id LIMIT ?",
            SKILL_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn count_without_fingerprint(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM skills WHERE indexed_fingerprint IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn update_fingerprint(
        &self,
        document_id: &str,
        fingerprint: &Fingerprint,
    ) -> Result<()> {
        let row = sqlx::query(&format!("SELECT {} FROM skills WHERE id = ?", SKILL_COLUMNS))
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            bail!("Unknown skill: {}", document_id);
        };
        let current = row_to_document(&row);
        if current.fingerprint() != *fingerprint {
            bail!("Skill {} changed since it was loaded", document_id);
        }

        // Compare-and-set on the content just read: an edit landing between
        // the read and this write leaves the watermark NULL.
        let tags_json: String = row.get("tags_json");
        let updated = sqlx::query(
            "UPDATE skills SET indexed_fingerprint = ? \
             WHERE id = ? AND title = ? AND description = ? AND body = ? AND tags_json = ?",
        )
        .bind(fingerprint.as_str())
        .bind(document_id)
        .bind(&current.title)
        .bind(&current.description)
        .bind(&current.body)
        .bind(&tags_json)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if updated == 0 {
            bail!("Skill {} changed since it was loaded", document_id);
        }
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("SELECT {} FROM skills WHERE id = ?", SKILL_COLUMNS))
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }
}

#[async_trait]
impl LexicalIndex for SqliteStore {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let expression = match fts_expression(text) {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let title_rows = self
            .fts_hits(&format!("{{title tags}} : {}", expression), limit)
            .await
            .context("title query failed")?;

        let mut hits = Vec::with_capacity(limit);
        let mut seen = HashSet::new();
        for row in &title_rows {
            let rank: f64 = row.get("rank");
            let id: String = row.get("skill_id");
            seen.insert(id.clone());
            hits.push(LexicalHit {
                document_id: id,
                category: MatchCategory::Title,
                snippet: None,
                score: -rank,
            });
        }

        let remaining = limit - hits.len();
        if remaining == 0 {
            return Ok(hits);
        }

        let content_rows = self
            .fts_hits(
                &format!("{{description body}} : {}", expression),
                remaining + seen.len(),
            )
            .await
            .context("content query failed")?;

        for row in &content_rows {
            let id: String = row.get("skill_id");
            if seen.contains(&id) {
                continue;
            }
            let rank: f64 = row.get("rank");
            let snippet: Option<String> = row.get("snippet");
            hits.push(LexicalHit {
                document_id: id,
                category: MatchCategory::Content,
                snippet: snippet.filter(|s| s.contains(HIGHLIGHT_OPEN)),
                score: -rank,
            });
            if hits.len() == limit {
                break;
            }
        }

        Ok(hits)
    }
}

/// Vector index on SQLite with brute-force cosine search.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { pool, embedder }
    }

    /// Number of stored vectors with the provider's dimensionality.
    pub async fn vector_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM skill_vectors WHERE dims = ?")
            .bind(self.embedder.dims() as i64)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn store_vector(&self, doc: &Document, vector: &[f32]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO skill_vectors (skill_id, model, dims, fingerprint, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(skill_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                fingerprint = excluded.fingerprint,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(&doc.id)
        .bind(self.embedder.model_name())
        .bind(vector.len() as i64)
        .bind(doc.fingerprint().as_str())
        .bind(vec_to_blob(vector))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert_batch(&self, documents: &[Document]) -> Result<UpsertReport> {
        if documents.is_empty() {
            return Ok(UpsertReport::default());
        }

        let texts: Vec<String> = documents.iter().map(Document::indexable_text).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        let dims = self.embedder.dims();

        let mut report = UpsertReport::default();
        for (i, doc) in documents.iter().enumerate() {
            let vector = match vectors.get(i) {
                Some(v) => v,
                None => {
                    report
                        .errors
                        .push(DocumentError::new(&doc.id, "provider returned no vector"));
                    continue;
                }
            };
            if vector.len() != dims {
                report.errors.push(DocumentError::new(
                    &doc.id,
                    format!("expected {} dims, got {}", dims, vector.len()),
                ));
                continue;
            }
            match self.store_vector(doc, vector).await {
                Ok(()) => report.succeeded.push(doc.id.clone()),
                Err(e) => report
                    .errors
                    .push(DocumentError::new(&doc.id, format!("write failed: {}", e))),
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
        if limit == 0 || vector.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT v.skill_id, v.embedding, s.description
            FROM skill_vectors v
            JOIN skills s ON s.id = v.skill_id
            WHERE v.dims = ?
            "#,
        )
        .bind(vector.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<VectorHit> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(vector, &blob_to_vec(&blob));
                if score < similarity_threshold {
                    return None;
                }
                let description: String = row.get("description");
                Some(VectorHit {
                    document_id: row.get("skill_id"),
                    score,
                    summary: Some(description).filter(|d| !d.trim().is_empty()),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn is_available(&self) -> bool {
        if self.embedder.dims() == 0 {
            return false;
        }
        match self.vector_count().await {
            Ok(count) => count > 0,
            Err(error) => {
                tracing::warn!(%error, "vector count failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_expression_quotes_terms() {
        assert_eq!(
            fts_expression("Docker compose").as_deref(),
            Some("(\"docker\"* OR \"compose\"*)")
        );
        assert_eq!(fts_expression("  ").as_deref(), None);
        assert_eq!(fts_expression("a").as_deref(), None);
    }

    #[test]
    fn test_fts_expression_neutralizes_operators() {
        let expr = fts_expression("title:secret NOT docker").unwrap_or_default();
        assert!(expr.contains("\"title\"*"));
        assert!(expr.contains("\"not\"*"));
        assert!(!expr.contains(':'));
    }
}
