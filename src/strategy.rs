//! The shared contract both scoring strategies implement.
//!
//! Composition over inheritance: a tagged trait object, not a class
//! hierarchy, because the embedding strategy also carries caches the
//! statistical variant has no use for. All four methods are idempotent with
//! respect to pure reads; only `update_state` mutates non-metric state.

use async_trait::async_trait;

use crate::config::AdaptiveConfig;
use crate::error::Result;
use crate::ports::FetchResult;
use crate::state::{CrawlState, Link};

/// A link paired with the score its strategy assigned it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLink {
    pub link: Link,
    pub score: f64,
}

#[async_trait]
pub trait CrawlStrategy: Send + Sync {
    /// Attach the run's config to the strategy instance. Called once by the
    /// loop before anything else, so `confidence`'s weight lookups (the only
    /// method without a `config` parameter) see the same config the loop
    /// validated and the other methods were called with.
    fn attach_config(&mut self, config: &AdaptiveConfig);

    /// One-time setup at digest start, before the seed fetch, run only when
    /// not resuming from persistence. The statistical strategy has nothing
    /// to do here; the embedding strategy uses it to expand the query space.
    async fn initialize(&mut self, _state: &mut CrawlState) -> Result<()> {
        Ok(())
    }

    /// Integrate freshly fetched documents into state.
    async fn update_state(&mut self, state: &mut CrawlState, new_fetches: &[FetchResult]) -> Result<()>;

    /// Estimate how well state answers the query, in [0,1]. Also writes
    /// component metrics into `state.metrics`.
    fn confidence(&mut self, state: &mut CrawlState) -> Result<f64>;

    /// Produce a descending-by-score ranking of uncrawled pending links.
    /// Async because the embedding strategy embeds any not-yet-cached link
    /// preview text as part of scoring. Takes `state` mutably because the
    /// embedding strategy records a `semantic_gaps` snapshot of the gaps it
    /// computed for this ranking pass.
    async fn rank_links(&mut self, state: &mut CrawlState, config: &AdaptiveConfig) -> Result<Vec<ScoredLink>>;

    /// Terminal test. May append to `state.confidence_history` and write
    /// `state.metrics["stopped_reason"]`. Async because the embedding
    /// strategy's validation probe embeds held-out queries lazily.
    async fn should_stop(&mut self, state: &mut CrawlState, config: &AdaptiveConfig) -> Result<bool>;

    /// Rescale the raw confidence value the loop records at finalize time.
    /// The statistical strategy's raw confidence is already user-facing, so
    /// the default is the identity function; the embedding strategy
    /// overrides this to apply `quality_confidence`'s validation-gated
    /// rescaling, which must never feed back into the stop test itself.
    fn finalize_confidence(&self, _state: &CrawlState, raw_confidence: f64) -> f64 {
        raw_confidence
    }
}
