//! Adaptive, confidence-driven web crawling.
//!
//! Instead of crawling to a fixed depth or page budget, a [`CrawlStrategy`]
//! scores how well the accumulated [`CrawlState`] answers a query after
//! every batch of fetches, and the loop in [`engine`] stops the moment that
//! score (or a strategy-specific proxy for it) clears a threshold, plateaus,
//! or the frontier runs dry. Two strategies ship: [`strategy_statistical`]
//! (term-frequency coverage/consistency/saturation, no external services)
//! and [`strategy_embedding`] (dense-vector coverage against an LLM-expanded
//! query set, gated by held-out validation).
//!
//! Fetching, embedding, and query expansion are host concerns — this crate
//! only declares the [`ports`] those collaborators must implement.

pub mod config;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod ports;
pub mod state;
pub mod strategy;
pub mod strategy_embedding;
pub mod strategy_statistical;
pub mod tokenizer;
pub mod vectormath;

pub use config::{AdaptiveConfig, StrategyKind};
pub use engine::{digest, is_sufficient, top_relevant};
pub use error::{AdaptiveError, Result};
pub use ports::{Embedder, FetchResult, Fetcher, QueryExpander};
pub use state::{CrawlState, Document, DocumentLinks, HeadMeta, Link, MetricValue};
pub use strategy::{CrawlStrategy, ScoredLink};
pub use strategy_embedding::EmbeddingStrategy;
pub use strategy_statistical::StatisticalStrategy;
pub use tokenizer::tokenize;
