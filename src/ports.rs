//! External collaborators the core consumes but never implements: the web
//! fetcher, the embedding provider, and the query-expansion LLM. All three
//! are out of scope for this crate (browser automation, HTTP, JS rendering,
//! and LLM providers are a host application's concern) — this module only
//! fixes the Rust shape of the seam, mirroring how `riptide-types::ports`
//! declares interfaces its consumer crates implement elsewhere.

use async_trait::async_trait;

use crate::error::Result;
use crate::state::DocumentLinks;

/// The result of fetching a single URL.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub success: bool,
    pub url: String,
    /// Raw markdown extracted from the page. Empty if `success` is false.
    pub markdown: String,
    pub links: DocumentLinks,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

impl FetchResult {
    pub fn failure(url: impl Into<String>) -> Self {
        FetchResult {
            success: false,
            url: url.into(),
            markdown: String::new(),
            links: DocumentLinks::default(),
            metadata: std::collections::HashMap::new(),
        }
    }
}

/// Fetches a single URL, rendering and extracting markdown plus outbound
/// links. The core asks implementations to filter internal links lacking
/// head data before returning, per the interface note in the external-
/// interfaces section.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, query: &str) -> Result<FetchResult>;
}

/// Embeds a batch of texts. Implementations must be deterministic for equal
/// inputs, produce L2-normalizable rows, and hold dimensionality constant
/// across a run; provider selection is opaque to the core.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Synthesizes at least `n` query variations (paraphrases, related
/// sub-questions) for the embedding strategy's query-space expansion. The
/// original query is added by the core, not expected from the expander.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand_query(&self, query: &str, n: usize) -> Result<Vec<String>>;
}
