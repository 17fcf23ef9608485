//! End-to-end tests against a real SQLite database in a temp directory,
//! using the offline hash embedder so no network is needed.

use skill_index::config::{self, Config};
use skill_index::index_cmd::{pending_count, run_index_all, run_index_pending};
use skill_index::migrate;
use skill_index::progress::NoProgress;
use skill_index::search::{search_skills, SearchOverrides};
use skill_index::skill_index_core::models::{Document, MatchCategory, MatchSource};
use skill_index::skill_index_core::store::DocumentStore;
use skill_index::sqlite_store::SqliteStore;
use std::collections::HashSet;
use tempfile::TempDir;
use tokio::sync::watch;

fn hash_config(dir: &TempDir) -> Config {
    let db_path = dir.path().join("data").join("skills.sqlite");
    let content = format!(
        r#"
[db]
path = "{}"

[indexer]
batch_size = 2
retry_base_delay_ms = 1

[embedding]
provider = "hash"
dims = 256
"#,
        db_path.display()
    );
    let config: Config = toml::from_str(&content).unwrap();
    config::validate(&config).unwrap();
    config
}

fn skills() -> Vec<Document> {
    vec![
        Document::new(
            "docker-basics",
            "Docker basics",
            "Build and run containers",
            "Write a Dockerfile, build an image, run it with port mappings.",
        )
        .with_tags(["containers"]),
        Document::new(
            "deploy-service",
            "Deploying a web service",
            "Ship a service to production",
            "Package the app with docker and push the image to the registry before rollout.",
        ),
        Document::new(
            "sourdough",
            "Sourdough bread",
            "Bake a loaf",
            "Feed the starter, mix, proof overnight and bake hot.",
        ),
    ]
}

async fn seeded(dir: &TempDir) -> Config {
    let config = hash_config(dir);
    migrate::run_migrations(&config).await.unwrap();
    let pool = skill_index::db::connect(&config).await.unwrap();
    let store = SqliteStore::new(pool.clone());
    for doc in skills() {
        store.upsert_document(&doc).await.unwrap();
    }
    pool.close().await;
    config
}

fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = hash_config(&dir);
    migrate::run_migrations(&config).await.unwrap();
    migrate::run_migrations(&config).await.unwrap();
    assert_eq!(pending_count(&config).await.unwrap(), 0);
}

#[tokio::test]
async fn test_index_then_rerun_skips_everything() {
    let dir = TempDir::new().unwrap();
    let config = seeded(&dir).await;
    assert_eq!(pending_count(&config).await.unwrap(), 3);

    let first = run_index_all(&config, no_cancel(), &NoProgress).await.unwrap();
    assert_eq!(first.progress.total, 3);
    assert_eq!(first.progress.completed, 3);
    assert_eq!(first.progress.failed, 0);
    assert_eq!(first.batches, 2);
    assert_eq!(pending_count(&config).await.unwrap(), 0);

    let second = run_index_all(&config, no_cancel(), &NoProgress).await.unwrap();
    assert_eq!(second.progress.completed, 0);
    assert_eq!(second.progress.skipped, 3);
}

#[tokio::test]
async fn test_edit_makes_skill_pending_again() {
    let dir = TempDir::new().unwrap();
    let config = seeded(&dir).await;
    run_index_all(&config, no_cancel(), &NoProgress).await.unwrap();

    let pool = skill_index::db::connect(&config).await.unwrap();
    let store = SqliteStore::new(pool.clone());
    let mut doc = skills().remove(2);
    doc.body.push_str(" Let it cool before slicing.");
    store.upsert_document(&doc).await.unwrap();
    // Same content again: the watermark stays.
    store.upsert_document(&skills()[0]).await.unwrap();
    pool.close().await;

    assert_eq!(pending_count(&config).await.unwrap(), 1);
    let outcome = run_index_pending(&config, no_cancel(), &NoProgress).await.unwrap();
    assert_eq!(outcome.progress.total, 1);
    assert_eq!(outcome.progress.completed, 1);
    assert_eq!(pending_count(&config).await.unwrap(), 0);
}

#[tokio::test]
async fn test_watermark_write_loses_to_concurrent_edit() {
    let dir = TempDir::new().unwrap();
    let config = seeded(&dir).await;
    let pool = skill_index::db::connect(&config).await.unwrap();
    let store = SqliteStore::new(pool.clone());

    let loaded = store.get_document("sourdough").await.unwrap().unwrap();
    let stale = loaded.fingerprint();
    let mut edited = loaded.clone();
    edited.body.push_str(" Let it cool before slicing.");
    store.upsert_document(&edited).await.unwrap();

    assert!(store.update_fingerprint("sourdough", &stale).await.is_err());
    let stored = store.get_document("sourdough").await.unwrap().unwrap();
    assert_eq!(stored.last_indexed_fingerprint, None);

    store.update_fingerprint("sourdough", &edited.fingerprint()).await.unwrap();
    assert!(store.get_document("sourdough").await.unwrap().unwrap().is_up_to_date());
    pool.close().await;
}

#[tokio::test]
async fn test_title_match_ranks_above_body_match() {
    let dir = TempDir::new().unwrap();
    let config = seeded(&dir).await;
    run_index_all(&config, no_cancel(), &NoProgress).await.unwrap();

    let results = search_skills(&config, "docker", &SearchOverrides::default())
        .await
        .unwrap();

    assert_eq!(results.title_matches[0].document_id, "docker-basics");
    assert_eq!(results.title_matches[0].match_category, MatchCategory::Title);
    assert!(results.title_matches[0].snippets.is_empty());

    let body_hit = results
        .content_matches
        .iter()
        .find(|h| h.document_id == "deploy-service")
        .expect("body match present");
    assert_eq!(body_hit.source, MatchSource::Lexical);
    assert!(body_hit.snippets.iter().any(|s| s.contains(">>>docker<<<")));

    let ids: Vec<_> = results.document_ids();
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(ids.len(), unique.len());
}

#[tokio::test]
async fn test_semantic_only_search_returns_semantic_hits() {
    let dir = TempDir::new().unwrap();
    let config = seeded(&dir).await;
    run_index_all(&config, no_cancel(), &NoProgress).await.unwrap();

    // Identical text embeds to the identical vector.
    let query = skills()[2].indexable_text();
    let overrides = SearchOverrides {
        include_lexical: Some(false),
        ..SearchOverrides::default()
    };
    let results = search_skills(&config, &query, &overrides).await.unwrap();

    assert!(results.title_matches.is_empty());
    let top = &results.content_matches[0];
    assert_eq!(top.document_id, "sourdough");
    assert_eq!(top.source, MatchSource::Semantic);
    assert_eq!(top.snippets, vec!["Bake a loaf".to_string()]);
}

#[tokio::test]
async fn test_dead_provider_degrades_to_lexical() {
    let dir = TempDir::new().unwrap();
    let config = seeded(&dir).await;
    run_index_all(&config, no_cancel(), &NoProgress).await.unwrap();

    let mut broken = config.clone();
    broken.embedding.provider = "ollama".to_string();
    broken.embedding.model = Some("nomic-embed-text".to_string());
    broken.embedding.url = Some("http://127.0.0.1:9".to_string());
    broken.embedding.timeout_secs = 2;

    let results = search_skills(&broken, "docker", &SearchOverrides::default())
        .await
        .unwrap();
    assert_eq!(results.title_matches[0].document_id, "docker-basics");
    assert!(results
        .iter()
        .all(|hit| hit.source == MatchSource::Lexical));
}

#[tokio::test]
async fn test_deleted_skill_disappears_from_search() {
    let dir = TempDir::new().unwrap();
    let config = seeded(&dir).await;
    run_index_all(&config, no_cancel(), &NoProgress).await.unwrap();

    let pool = skill_index::db::connect(&config).await.unwrap();
    let store = SqliteStore::new(pool.clone());
    assert!(store.delete_document("docker-basics").await.unwrap());
    assert!(!store.delete_document("docker-basics").await.unwrap());
    pool.close().await;

    let results = search_skills(&config, "docker", &SearchOverrides::default())
        .await
        .unwrap();
    assert!(!results.contains("docker-basics"));
    assert!(results.contains("deploy-service"));
}

#[tokio::test]
async fn test_disabled_provider_refuses_to_index() {
    let dir = TempDir::new().unwrap();
    let mut config = seeded(&dir).await;
    config.embedding.provider = "disabled".to_string();

    assert!(run_index_all(&config, no_cancel(), &NoProgress).await.is_err());
    // Lexical search needs no provider.
    let results = search_skills(&config, "sourdough", &SearchOverrides::default())
        .await
        .unwrap();
    assert_eq!(results.title_matches[0].document_id, "sourdough");
}
