//! Encode/decode `CrawlState` to/from a self-describing JSON document, for
//! pause/resume and sharing. Writes are atomic (write to a tempfile in the
//! target directory, then rename) so a crash mid-write never corrupts the
//! previous checkpoint — the same pattern `riptide-persistence` uses for
//! its own checkpoint writes, without that crate's Redis/hot-reload
//! machinery, which this crate has no use for.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AdaptiveError, Result};
use crate::state::{CrawlState, Document, Link, MetricValue};

/// The wire format named in the external-interfaces section: every field
/// `CrawlState` carries, flattened into one document. Numeric matrices are
/// nested JSON arrays, never text-encoded floats, so cosine distances
/// round-trip within the 1e-6 tolerance the persistence law requires.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    /// When this checkpoint was written. Informational only — resuming
    /// never reasons about elapsed time, so a missing value on an older
    /// document simply yields `None` rather than failing the load.
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,

    query: String,
    crawled_urls: Vec<String>,
    crawl_order: Vec<String>,
    knowledge_base: Vec<Document>,
    pending_links: Vec<Link>,
    metrics: std::collections::HashMap<String, MetricValue>,

    term_frequencies: std::collections::HashMap<String, u64>,
    document_frequencies: std::collections::HashMap<String, u64>,
    documents_with_terms: std::collections::HashMap<String, Vec<usize>>,
    total_documents: usize,
    new_terms_history: Vec<u64>,

    #[serde(default)]
    kb_embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    query_embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    expanded_queries: Vec<String>,
    #[serde(default)]
    embedding_model: Option<String>,
    #[serde(default)]
    semantic_gaps: Vec<(Vec<f32>, f32)>,
    #[serde(default)]
    confidence_history: Vec<f64>,
    #[serde(default)]
    validation_queries: Vec<String>,

    #[serde(default)]
    pages_crawled: usize,
    #[serde(default)]
    depth_reached: usize,
}

impl From<&CrawlState> for PersistedState {
    fn from(s: &CrawlState) -> Self {
        PersistedState {
            saved_at: Some(Utc::now()),
            query: s.query.clone(),
            crawled_urls: s.crawled_urls.iter().cloned().collect(),
            crawl_order: s.crawl_order.clone(),
            knowledge_base: s.knowledge_base.clone(),
            pending_links: s.pending_links.clone(),
            metrics: s.metrics.clone(),
            term_frequencies: s.term_frequencies.clone(),
            document_frequencies: s.document_frequencies.clone(),
            documents_with_terms: s
                .documents_with_terms
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().copied().collect()))
                .collect(),
            total_documents: s.total_documents,
            new_terms_history: s.new_terms_history.clone(),
            kb_embeddings: s.kb_embeddings.clone(),
            query_embeddings: s.query_embeddings.clone(),
            expanded_queries: s.expanded_queries.clone(),
            embedding_model: s.embedding_model.clone(),
            semantic_gaps: s.semantic_gaps.clone(),
            confidence_history: s.confidence_history.clone(),
            validation_queries: s.validation_queries.clone(),
            pages_crawled: s.pages_crawled,
            depth_reached: s.depth_reached,
        }
    }
}

impl From<PersistedState> for CrawlState {
    fn from(p: PersistedState) -> Self {
        CrawlState {
            query: p.query,
            crawled_urls: p.crawled_urls.into_iter().collect(),
            crawl_order: p.crawl_order,
            knowledge_base: p.knowledge_base,
            pending_links: p.pending_links,
            metrics: p.metrics,
            term_frequencies: p.term_frequencies,
            document_frequencies: p.document_frequencies,
            documents_with_terms: p
                .documents_with_terms
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect(),
            total_documents: p.total_documents,
            new_terms_history: p.new_terms_history,
            kb_embeddings: p.kb_embeddings,
            query_embeddings: p.query_embeddings,
            expanded_queries: p.expanded_queries,
            embedding_model: p.embedding_model,
            semantic_gaps: p.semantic_gaps,
            confidence_history: p.confidence_history,
            validation_queries: p.validation_queries,
            pages_crawled: p.pages_crawled,
            depth_reached: p.depth_reached,
        }
    }
}

/// Load state from `path`. A missing or malformed file is an error — unlike
/// a failed write, a failed load has no safe fallback.
pub async fn load(path: &Path) -> Result<CrawlState> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| AdaptiveError::PersistenceLoad {
            path: path.display().to_string(),
            source,
        })?;
    let persisted: PersistedState = serde_json::from_slice(&bytes)?;
    debug!(path = %path.display(), "loaded persisted state");
    Ok(persisted.into())
}

/// Persist state to `path` atomically: write to a tempfile in the same
/// directory, then rename over the destination. Per the error-handling
/// policy, write failures are logged and swallowed — persistence is
/// best-effort and must never abort a running loop.
pub async fn save(state: &CrawlState, path: &Path) -> Result<()> {
    let persisted = PersistedState::from(state);
    let json = serde_json::to_vec_pretty(&persisted)?;

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let write_result = write_atomic(path, dir, &json).await;
    if let Err(ref e) = write_result {
        warn!(path = %path.display(), error = %e, "failed to persist crawl state; continuing run");
    }
    write_result
}

async fn write_atomic(path: &Path, dir: Option<&Path>, bytes: &[u8]) -> Result<()> {
    let dir = dir.unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| AdaptiveError::PersistenceWrite {
        path: path.display().to_string(),
        source,
    })?;
    tokio::fs::write(tmp.path(), bytes)
        .await
        .map_err(|source| AdaptiveError::PersistenceWrite {
            path: path.display().to_string(),
            source,
        })?;
    tmp.persist(path)
        .map_err(|e| AdaptiveError::PersistenceWrite {
            path: path.display().to_string(),
            source: e.error,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Link;

    #[tokio::test]
    async fn round_trips_statistical_state_within_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = CrawlState::new("alpha beta");
        state.knowledge_base.push(Document {
            url: "https://a".into(),
            markdown: "alpha beta content".into(),
            links: Default::default(),
            metadata: Default::default(),
        });
        state.crawled_urls.insert("https://a".into());
        state.crawl_order.push("https://a".into());
        state.total_documents = 1;
        state.pending_links.push(Link::new("https://b"));
        state.set_metric("confidence", 0.42_f64);

        save(&state, &path).await.unwrap();
        let loaded = load(&path).await.unwrap();

        assert_eq!(loaded.query, state.query);
        assert_eq!(loaded.crawl_order, state.crawl_order);
        assert_eq!(loaded.total_documents, state.total_documents);
        assert_eq!(loaded.metric_f64("confidence"), Some(0.42));
    }

    #[tokio::test]
    async fn round_trips_embeddings_within_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = CrawlState::new("q");
        state.kb_embeddings = vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]];
        state.query_embeddings = vec![vec![0.9, 0.8, 0.7]];

        save(&state, &path).await.unwrap();
        let loaded = load(&path).await.unwrap();

        for (a, b) in loaded.kb_embeddings.iter().flatten().zip(state.kb_embeddings.iter().flatten()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn loading_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(load(&path).await.is_err());
    }
}
