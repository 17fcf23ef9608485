//! Hybrid lexical + semantic search over skill documents.
//!
//! The service works entirely through the collaborator traits in
//! [`crate::store`] and [`crate::embedding`]; it holds no state between
//! calls.
//!
//! # Merge Algorithm
//!
//! 1. Query the [`LexicalIndex`] (when `include_lexical`) for up to `limit`
//!    hits, already classified as title-level or content-level.
//! 2. Embed the query and query the [`VectorIndex`] (when
//!    `include_semantic` and a backend is configured and available) for up
//!    to `limit` hits at or above `similarity_threshold`.
//! 3. Title hits first, in lexical order.
//! 4. Content hits next, in lexical order, with snippets.
//! 5. Semantic hits last, appended to the content list, in similarity order,
//!    skipping any document already present.
//! 6. Keep all title matches up to `limit`, then fill the remainder with
//!    content matches.
//!
//! Scores are never re-computed: ordering inside each category is the
//! originating index's ordering. A failure anywhere in step 2 is logged and
//! the query is answered from lexical results alone; a lexical failure is
//! returned to the caller.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::models::{MatchCategory, MatchSource, SearchHit, SearchResultSet};
use crate::snippet::{extract_snippets, SnippetOptions};
use crate::store::{DocumentStore, LexicalHit, LexicalIndex, VectorHit, VectorIndex};

/// Default result cap.
pub const DEFAULT_LIMIT: usize = 20;
/// Default semantic cutoff, deliberately permissive.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// A single search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    /// Upper bound on `title_matches.len() + content_matches.len()`.
    pub limit: usize,
    /// Minimum cosine similarity for semantic hits.
    pub similarity_threshold: f32,
    pub include_lexical: bool,
    pub include_semantic: bool,
}

impl SearchQuery {
    /// Hybrid query with default limit and threshold.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: DEFAULT_LIMIT,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            include_lexical: true,
            include_semantic: true,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, similarity_threshold: f32) -> Self {
        self.similarity_threshold = similarity_threshold;
        self
    }

    pub fn lexical_only(mut self) -> Self {
        self.include_lexical = true;
        self.include_semantic = false;
        self
    }

    pub fn semantic_only(mut self) -> Self {
        self.include_lexical = false;
        self.include_semantic = true;
        self
    }
}

/// Query embedder plus the vector index it queries.
#[derive(Clone)]
pub struct SemanticBackend {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vectors: Arc<dyn VectorIndex>,
}

/// Answers [`SearchQuery`]s against a lexical index and an optional
/// semantic backend.
#[derive(Clone)]
pub struct HybridSearchService {
    lexical: Arc<dyn LexicalIndex>,
    semantic: Option<SemanticBackend>,
    documents: Option<Arc<dyn DocumentStore>>,
    snippets: SnippetOptions,
}

impl HybridSearchService {
    pub fn new(lexical: Arc<dyn LexicalIndex>) -> Self {
        Self {
            lexical,
            semantic: None,
            documents: None,
            snippets: SnippetOptions::default(),
        }
    }

    /// Enable semantic hits.
    pub fn with_semantic(
        mut self,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorIndex>,
    ) -> Self {
        self.semantic = Some(SemanticBackend { embedder, vectors });
        self
    }

    /// Document source used to extract snippets the lexical engine did not supply.
    pub fn with_documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn with_snippet_options(mut self, snippets: SnippetOptions) -> Self {
        self.snippets = snippets;
        self
    }

    pub fn has_semantic(&self) -> bool {
        self.semantic.is_some()
    }

    /// Run a hybrid search.
    ///
    /// # Errors
    ///
    /// Only when the lexical index fails. Semantic failures degrade to
    /// lexical-only results.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResultSet> {
        let text = query.text.trim();
        if text.is_empty() || query.limit == 0 {
            return Ok(SearchResultSet::default());
        }

        let lexical_hits = if query.include_lexical {
            self.lexical
                .query(text, query.limit)
                .await
                .context("lexical search failed")?
        } else {
            Vec::new()
        };

        let semantic_hits = if query.include_semantic {
            match self.semantic_hits(text, query).await {
                Ok(hits) => hits,
                Err(error) => {
                    warn!(%error, "semantic search unavailable, using lexical results only");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        debug!(
            lexical = lexical_hits.len(),
            semantic = semantic_hits.len(),
            "merging search candidates"
        );

        let mut results = self.merge(text, lexical_hits, semantic_hits).await;
        truncate_to_limit(&mut results, query.limit);
        Ok(results)
    }

    async fn semantic_hits(&self, text: &str, query: &SearchQuery) -> Result<Vec<VectorHit>> {
        let Some(backend) = &self.semantic else {
            return Ok(Vec::new());
        };
        if !backend.vectors.is_available().await {
            debug!("vector index not available, skipping semantic search");
            return Ok(Vec::new());
        }

        let vector = embed_query(backend.embedder.as_ref(), text)
            .await
            .context("failed to embed query")?;
        let mut hits = backend
            .vectors
            .query(&vector, query.limit, query.similarity_threshold)
            .await
            .context("vector query failed")?;
        hits.retain(|h| h.score >= query.similarity_threshold);
        Ok(hits)
    }

    async fn merge(
        &self,
        text: &str,
        lexical: Vec<LexicalHit>,
        semantic: Vec<VectorHit>,
    ) -> SearchResultSet {
        let mut seen: HashSet<String> = HashSet::new();
        let mut results = SearchResultSet::default();

        let (titles, contents): (Vec<LexicalHit>, Vec<LexicalHit>) = lexical
            .into_iter()
            .partition(|h| h.category == MatchCategory::Title);

        for hit in titles {
            if seen.insert(hit.document_id.clone()) {
                results.title_matches.push(SearchHit {
                    document_id: hit.document_id,
                    match_category: MatchCategory::Title,
                    source: MatchSource::Lexical,
                    snippets: Vec::new(),
                    score: hit.score,
                });
            }
        }

        for hit in contents {
            if !seen.insert(hit.document_id.clone()) {
                continue;
            }
            let snippets = match hit.snippet {
                Some(s) if !s.trim().is_empty() => vec![s],
                _ => self.extract(&hit.document_id, text).await,
            };
            results.content_matches.push(SearchHit {
                document_id: hit.document_id,
                match_category: MatchCategory::Content,
                source: MatchSource::Lexical,
                snippets,
                score: hit.score,
            });
        }

        for hit in semantic {
            if seen.insert(hit.document_id.clone()) {
                results.content_matches.push(SearchHit {
                    document_id: hit.document_id,
                    match_category: MatchCategory::Content,
                    source: MatchSource::Semantic,
                    snippets: hit.summary.into_iter().filter(|s| !s.is_empty()).collect(),
                    score: f64::from(hit.score),
                });
            }
        }

        results
    }

    /// Snippets from the stored body; a lookup failure just means no snippet.
    async fn extract(&self, document_id: &str, text: &str) -> Vec<String> {
        let Some(documents) = &self.documents else {
            return Vec::new();
        };
        match documents.get_document(document_id).await {
            Ok(Some(doc)) => {
                let mut snippets = extract_snippets(&doc.body, text, &self.snippets);
                if snippets.is_empty() {
                    snippets = extract_snippets(&doc.description, text, &self.snippets);
                }
                snippets
            }
            Ok(None) => Vec::new(),
            Err(error) => {
                debug!(%error, document_id, "could not load document for snippet");
                Vec::new()
            }
        }
    }
}

/// Cap the combined length at `limit`, keeping title matches first.
pub fn truncate_to_limit(results: &mut SearchResultSet, limit: usize) {
    results.title_matches.truncate(limit);
    let room = limit - results.title_matches.len();
    results.content_matches.truncate(room);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::store::memory::{InMemoryStore, InMemoryVectorIndex};
    use crate::store::VectorIndex;
    use anyhow::bail;
    use async_trait::async_trait;

    /// Lexical index returning a fixed hit list.
    struct FixedLexical(Vec<LexicalHit>);

    #[async_trait]
    impl LexicalIndex for FixedLexical {
        async fn query(&self, _text: &str, limit: usize) -> Result<Vec<LexicalHit>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    struct FailingLexical;

    #[async_trait]
    impl LexicalIndex for FailingLexical {
        async fn query(&self, _text: &str, _limit: usize) -> Result<Vec<LexicalHit>> {
            bail!("fts index corrupt")
        }
    }

    /// Vector index returning a fixed hit list.
    struct FixedVectors(Vec<VectorHit>);

    #[async_trait]
    impl VectorIndex for FixedVectors {
        async fn upsert_batch(&self, _documents: &[Document]) -> Result<crate::store::UpsertReport> {
            Ok(Default::default())
        }
        async fn query(&self, _v: &[f32], limit: usize, _t: f32) -> Result<Vec<VectorHit>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        fn model_name(&self) -> &str {
            "down"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("HTTP 503 from embedding provider")
        }
    }

    fn lexical(id: &str, category: MatchCategory, score: f64) -> LexicalHit {
        LexicalHit {
            document_id: id.to_string(),
            category,
            snippet: match category {
                MatchCategory::Title => None,
                MatchCategory::Content => Some(format!("...{}...", id)),
            },
            score,
        }
    }

    fn semantic(id: &str, score: f32) -> VectorHit {
        VectorHit {
            document_id: id.to_string(),
            score,
            summary: None,
        }
    }

    fn service(lex: Vec<LexicalHit>, sem: Vec<VectorHit>) -> HybridSearchService {
        HybridSearchService::new(Arc::new(FixedLexical(lex)))
            .with_semantic(Arc::new(UnitEmbedder), Arc::new(FixedVectors(sem)))
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.document_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_title_matches_rank_above_content() {
        // Engine listed the content hit first; titles still lead.
        let svc = service(
            vec![
                lexical("body-doc", MatchCategory::Content, 9.0),
                lexical("title-doc", MatchCategory::Title, 1.0),
            ],
            vec![],
        );
        let res = svc.search(&SearchQuery::new("docker")).await.unwrap();
        assert_eq!(ids(&res.title_matches), vec!["title-doc"]);
        assert_eq!(ids(&res.content_matches), vec!["body-doc"]);
        assert!(res.title_matches[0].snippets.is_empty());
        assert_eq!(res.content_matches[0].snippets, vec!["...body-doc..."]);
    }

    #[tokio::test]
    async fn test_semantic_duplicate_of_lexical_is_dropped() {
        let svc = service(
            vec![
                lexical("a", MatchCategory::Title, 2.0),
                lexical("b", MatchCategory::Content, 1.0),
            ],
            vec![semantic("b", 0.9), semantic("a", 0.8), semantic("c", 0.7)],
        );
        let res = svc.search(&SearchQuery::new("docker")).await.unwrap();
        assert_eq!(ids(&res.title_matches), vec!["a"]);
        assert_eq!(ids(&res.content_matches), vec!["b", "c"]);
        assert_eq!(res.content_matches[0].source, MatchSource::Lexical);
        assert_eq!(res.content_matches[1].source, MatchSource::Semantic);
        assert_eq!(res.len(), 3);
    }

    #[tokio::test]
    async fn test_lexical_duplicates_keep_title_category() {
        let svc = service(
            vec![
                lexical("a", MatchCategory::Content, 5.0),
                lexical("a", MatchCategory::Title, 1.0),
                lexical("b", MatchCategory::Content, 1.0),
                lexical("b", MatchCategory::Content, 0.5),
            ],
            vec![],
        );
        let res = svc.search(&SearchQuery::new("x y")).await.unwrap();
        assert_eq!(ids(&res.title_matches), vec!["a"]);
        assert_eq!(ids(&res.content_matches), vec!["b"]);
    }

    #[tokio::test]
    async fn test_semantic_hits_keep_similarity_order_after_lexical() {
        let svc = service(
            vec![lexical("lex", MatchCategory::Content, 1.0)],
            vec![semantic("s1", 0.95), semantic("s2", 0.6)],
        );
        let res = svc.search(&SearchQuery::new("deploy")).await.unwrap();
        assert_eq!(ids(&res.content_matches), vec!["lex", "s1", "s2"]);
        assert!((res.content_matches[1].score - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_threshold_filters_semantic_hits() {
        let svc = service(vec![], vec![semantic("hi", 0.9), semantic("lo", 0.2)]);
        let res = svc
            .search(&SearchQuery::new("deploy").with_threshold(0.5))
            .await
            .unwrap();
        assert_eq!(ids(&res.content_matches), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_limit_keeps_titles_first() {
        let svc = service(
            vec![
                lexical("t1", MatchCategory::Title, 3.0),
                lexical("t2", MatchCategory::Title, 2.0),
                lexical("c1", MatchCategory::Content, 1.0),
            ],
            vec![semantic("s1", 0.9)],
        );
        let res = svc.search(&SearchQuery::new("q").with_limit(3)).await.unwrap();
        assert_eq!(ids(&res.title_matches), vec!["t1", "t2"]);
        assert_eq!(ids(&res.content_matches), vec!["c1"]);

        let res = svc.search(&SearchQuery::new("q").with_limit(2)).await.unwrap();
        assert_eq!(ids(&res.title_matches), vec!["t1", "t2"]);
        assert!(res.content_matches.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_failure_degrades_to_lexical() {
        let svc = HybridSearchService::new(Arc::new(FixedLexical(vec![
            lexical("a", MatchCategory::Title, 1.0),
            lexical("b", MatchCategory::Content, 1.0),
        ])))
        .with_semantic(Arc::new(DownEmbedder), Arc::new(FixedVectors(vec![semantic("c", 0.9)])));

        let res = svc.search(&SearchQuery::new("docker")).await.unwrap();
        assert_eq!(ids(&res.title_matches), vec!["a"]);
        assert_eq!(ids(&res.content_matches), vec!["b"]);
    }

    #[tokio::test]
    async fn test_lexical_failure_is_an_error() {
        let svc = HybridSearchService::new(Arc::new(FailingLexical))
            .with_semantic(Arc::new(UnitEmbedder), Arc::new(FixedVectors(vec![])));
        let err = svc.search(&SearchQuery::new("docker")).await.unwrap_err();
        assert!(format!("{:#}", err).contains("fts index corrupt"));
    }

    #[tokio::test]
    async fn test_flags_select_sources() {
        let svc = service(
            vec![lexical("lex", MatchCategory::Title, 1.0)],
            vec![semantic("sem", 0.9)],
        );
        let lex = svc.search(&SearchQuery::new("q").lexical_only()).await.unwrap();
        assert_eq!(lex.document_ids(), vec!["lex"]);

        let sem = svc.search(&SearchQuery::new("q").semantic_only()).await.unwrap();
        assert_eq!(sem.document_ids(), vec!["sem"]);
        assert!(sem.title_matches.is_empty());
    }

    #[tokio::test]
    async fn test_service_without_semantic_backend_answers_lexically() {
        let svc = HybridSearchService::new(Arc::new(FixedLexical(vec![lexical(
            "lex",
            MatchCategory::Content,
            1.0,
        )])));
        assert!(!svc.has_semantic());
        assert!(service(vec![], vec![]).has_semantic());

        let res = svc.search(&SearchQuery::new("q")).await.unwrap();
        assert_eq!(res.document_ids(), vec!["lex"]);
        assert_eq!(res.content_matches[0].source, MatchSource::Lexical);

        assert!(svc.search(&SearchQuery::new("q").semantic_only()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_query_or_zero_limit_is_empty() {
        let svc = service(vec![lexical("a", MatchCategory::Title, 1.0)], vec![]);
        assert!(svc.search(&SearchQuery::new("   ")).await.unwrap().is_empty());
        assert!(svc
            .search(&SearchQuery::new("q").with_limit(0))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_vector_index_skips_embedding() {
        // DownEmbedder would fail, but an empty index is never queried.
        let empty = InMemoryVectorIndex::new(Arc::new(DownEmbedder));
        let svc = HybridSearchService::new(Arc::new(FixedLexical(vec![])))
            .with_semantic(Arc::new(DownEmbedder), Arc::new(empty));
        assert!(svc.search(&SearchQuery::new("q")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snippets_extracted_from_store_when_engine_has_none() {
        let store = Arc::new(InMemoryStore::with_documents(vec![
            Document::new("docker", "Docker", "Containers", "Build images."),
            Document::new(
                "k8s",
                "Kubernetes",
                "Orchestration",
                "Pods pull images built with docker and run them.",
            ),
        ]));
        let svc = HybridSearchService::new(store.clone()).with_documents(store);

        let res = svc.search(&SearchQuery::new("docker")).await.unwrap();
        assert_eq!(ids(&res.title_matches), vec!["docker"]);
        assert_eq!(ids(&res.content_matches), vec!["k8s"]);
        assert_eq!(
            res.content_matches[0].snippets,
            vec!["Pods pull images built with >>>docker<<< and run them."]
        );
    }

    #[tokio::test]
    async fn test_end_to_end_with_memory_backends() {
        let store = Arc::new(InMemoryStore::with_documents(vec![
            Document::new("docker", "Docker", "Container images", "Build images."),
            Document::new("podman", "Podman", "Container engine", "Daemonless containers."),
        ]));
        let vectors = Arc::new(InMemoryVectorIndex::new(Arc::new(UnitEmbedder)));
        let docs = store.list_all(10, 0).await.unwrap();
        vectors.upsert_batch(&docs).await.unwrap();

        let svc = HybridSearchService::new(store.clone())
            .with_documents(store)
            .with_semantic(Arc::new(UnitEmbedder), vectors);
        let res = svc.search(&SearchQuery::new("docker")).await.unwrap();

        // Every document embeds to the same vector; podman arrives semantically.
        assert_eq!(ids(&res.title_matches), vec!["docker"]);
        assert_eq!(ids(&res.content_matches), vec!["podman"]);
        assert_eq!(res.content_matches[0].source, MatchSource::Semantic);
        assert_eq!(res.content_matches[0].snippets, vec!["Container engine"]);
    }
}
