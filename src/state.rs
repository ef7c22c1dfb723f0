//! The single mutable object a run revolves around.
//!
//! `CrawlState` is a flat record, not a class hierarchy: the statistical and
//! embedding scratch fields both live here, embedding fields simply stay at
//! their defaults (empty vectors / maps) when the statistical strategy is in
//! use. This keeps the persistence schema single and closed, per the design
//! note on polymorphism over strategies.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Optional head metadata carried by a link preview.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeadMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
}

/// A pending or integrated hyperlink. Identity is `href`; every other field
/// is advisory and may be absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub href: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub head_meta: Option<HeadMeta>,
    #[serde(default)]
    pub intrinsic_score: Option<f64>,
    #[serde(default)]
    pub contextual_score: Option<f64>,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Link {
            href: href.into(),
            text: None,
            title: None,
            head_meta: None,
            intrinsic_score: None,
            contextual_score: None,
        }
    }

    /// Concatenate the text fields used for relevance/novelty scoring:
    /// `text`, `title`, and head-meta `title`/`description`/`keywords`.
    pub fn scoring_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(t) = &self.text {
            parts.push(t.as_str());
        }
        if let Some(t) = &self.title {
            parts.push(t.as_str());
        }
        if let Some(meta) = &self.head_meta {
            if let Some(t) = &meta.title {
                parts.push(t.as_str());
            }
            if let Some(d) = &meta.description {
                parts.push(d.as_str());
            }
            if let Some(k) = &meta.keywords {
                parts.push(k.as_str());
            }
        }
        parts.join(" ")
    }
}

/// Internal/external link buckets attached to a fetched document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentLinks {
    #[serde(default)]
    pub internal: Vec<Link>,
    #[serde(default)]
    pub external: Vec<Link>,
}

/// A single integrated knowledge-base entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub url: String,
    #[serde(rename = "content")]
    pub markdown: String,
    #[serde(default)]
    pub links: DocumentLinks,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A metric value. Most entries are numeric (coverage, confidence, ...) but
/// the stop test also records string/bool diagnostics (`stopped_reason`,
/// `_validation_passed`), so the map has to tolerate mixed types rather than
/// being a pure `HashMap<String, f64>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetricValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

/// The single mutable object a crawl revolves around. Owned exclusively by
/// the adaptive loop for the duration of a run and mutated only through
/// `CrawlStrategy` methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlState {
    pub query: String,
    pub crawled_urls: HashSet<String>,
    pub crawl_order: Vec<String>,
    pub knowledge_base: Vec<Document>,
    pub pending_links: Vec<Link>,
    pub metrics: HashMap<String, MetricValue>,

    // Statistical scratch.
    pub term_frequencies: HashMap<String, u64>,
    pub document_frequencies: HashMap<String, u64>,
    pub documents_with_terms: HashMap<String, HashSet<usize>>,
    pub total_documents: usize,
    pub new_terms_history: Vec<u64>,

    // Embedding scratch.
    pub kb_embeddings: Vec<Vec<f32>>,
    pub query_embeddings: Vec<Vec<f32>>,
    pub expanded_queries: Vec<String>,
    pub embedding_model: Option<String>,
    pub semantic_gaps: Vec<(Vec<f32>, f32)>,
    pub confidence_history: Vec<f64>,
    /// Held-out validation queries (unembedded; embedded lazily by the
    /// strategy on first validation probe). Not named explicitly in the
    /// wire-format field list but required to resume a run past the point
    /// where `should_stop`'s validation probe has already fired once,
    /// since query expansion is not re-run on resume.
    pub validation_queries: Vec<String>,

    pub pages_crawled: usize,
    pub depth_reached: usize,
}

impl CrawlState {
    pub fn new(query: impl Into<String>) -> Self {
        CrawlState {
            query: query.into(),
            crawled_urls: HashSet::new(),
            crawl_order: Vec::new(),
            knowledge_base: Vec::new(),
            pending_links: Vec::new(),
            metrics: HashMap::new(),
            term_frequencies: HashMap::new(),
            document_frequencies: HashMap::new(),
            documents_with_terms: HashMap::new(),
            total_documents: 0,
            new_terms_history: Vec::new(),
            kb_embeddings: Vec::new(),
            query_embeddings: Vec::new(),
            expanded_queries: Vec::new(),
            embedding_model: None,
            semantic_gaps: Vec::new(),
            confidence_history: Vec::new(),
            validation_queries: Vec::new(),
            pages_crawled: 0,
            depth_reached: 0,
        }
    }

    pub fn set_metric(&mut self, name: &str, value: impl Into<MetricValue>) {
        self.metrics.insert(name.to_string(), value.into());
    }

    pub fn metric_f64(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(MetricValue::as_f64)
    }

    /// Drop pending links whose href is already crawled. Called once per
    /// iteration so `crawled_urls` and `pending_links` are disjoint after
    /// the filter step (invariant 6), not necessarily before.
    pub fn filter_crawled_pending(&mut self) {
        let crawled = &self.crawled_urls;
        self.pending_links.retain(|l| !crawled.contains(&l.href));
    }

    /// Check the invariants that must hold at every observable loop boundary.
    /// Returns `Err` naming the first violated invariant; intended for use in
    /// tests and debug assertions, not the hot path.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !(self.knowledge_base.len() == self.total_documents
            && self.total_documents == self.crawl_order.len())
        {
            return Err(format!(
                "len(knowledge_base)={} total_documents={} len(crawl_order)={} must be equal",
                self.knowledge_base.len(),
                self.total_documents,
                self.crawl_order.len()
            ));
        }
        for u in &self.crawl_order {
            if !self.crawled_urls.contains(u) {
                return Err(format!("crawl_order entry {u} missing from crawled_urls"));
            }
        }
        for (term, df) in &self.document_frequencies {
            let actual = self
                .documents_with_terms
                .get(term)
                .map(|s| s.len() as u64)
                .unwrap_or(0);
            if *df != actual {
                return Err(format!(
                    "document_frequencies[{term}]={df} != |documents_with_terms[{term}]|={actual}"
                ));
            }
            if *df > self.total_documents as u64 {
                return Err(format!(
                    "document_frequencies[{term}]={df} exceeds total_documents={}",
                    self.total_documents
                ));
            }
        }
        for (term, tf) in &self.term_frequencies {
            let df = self.document_frequencies.get(term).copied().unwrap_or(0);
            if *tf < df {
                return Err(format!(
                    "term_frequencies[{term}]={tf} < document_frequencies[{term}]={df}"
                ));
            }
        }
        if !self.kb_embeddings.is_empty() {
            // Embedding row count may be less than total_documents if
            // deduplication dropped candidates; it may never exceed it.
            if self.kb_embeddings.len() > self.total_documents {
                return Err(format!(
                    "kb_embeddings rows={} exceed total_documents={}",
                    self.kb_embeddings.len(),
                    self.total_documents
                ));
            }
        }
        Ok(())
    }
}
