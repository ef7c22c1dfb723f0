//! Typed crawl configuration with a validator enforcing ranges and
//! weight-sum constraints, following the shape of `SpiderConfig`:
//! public fields, a `Default` impl carrying every documented default,
//! `with_*` builders for the options callers override routinely, and a
//! `validate` that names the offending option rather than failing silently.

use serde::{Deserialize, Serialize};

use crate::error::{AdaptiveError, Result};

/// Which `CrawlStrategy` implementation drives the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Statistical,
    Embedding,
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::Statistical
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Learning-score or statistical-confidence cutoff for stopping. 0-1.
    pub confidence_threshold: f64,
    /// Upper bound on loop iterations (not pages). >= 1.
    pub max_depth: u32,
    /// Upper bound on crawled URLs. >= 1.
    pub max_pages: u32,
    /// Batch width per iteration. >= 1.
    pub top_k_links: usize,
    /// Minimum top-ranked link score required to keep going. 0-1.
    pub min_gain_threshold: f64,
    /// Which strategy implementation to run.
    pub strategy: StrategyKind,

    /// Statistical diagnostic gating stop (saturation does gate; consistency
    /// is diagnostic only).
    pub saturation_threshold: f64,
    pub consistency_threshold: f64,

    pub coverage_weight: f64,
    pub consistency_weight: f64,
    pub saturation_weight: f64,

    pub relevance_weight: f64,
    pub novelty_weight: f64,
    pub authority_weight: f64,

    pub save_state: bool,
    pub state_path: String,

    pub embedding_model: String,
    pub n_query_variations: usize,

    pub embedding_coverage_radius: f64,
    pub embedding_k_exp: f64,
    pub embedding_nearest_weight: f64,
    pub embedding_top_k_weight: f64,
    pub embedding_overlap_threshold: f64,
    pub embedding_min_relative_improvement: f64,
    pub embedding_validation_min_score: f64,
    pub embedding_quality_min_confidence: f64,
    pub embedding_quality_max_confidence: f64,
    pub embedding_quality_scale_factor: f64,
    /// Cosine-similarity threshold above which a freshly embedded document
    /// is considered a duplicate of one already in the KB and dropped.
    /// Not named in the wire config surface but load-bearing for §4.4.2's
    /// dedup step, so it is exposed here rather than hardcoded.
    pub embedding_kb_similarity_threshold: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        AdaptiveConfig {
            confidence_threshold: 0.7,
            max_depth: 5,
            max_pages: 20,
            top_k_links: 3,
            min_gain_threshold: 0.1,
            strategy: StrategyKind::Statistical,

            saturation_threshold: 0.8,
            consistency_threshold: 0.7,

            coverage_weight: 0.4,
            consistency_weight: 0.3,
            saturation_weight: 0.3,

            relevance_weight: 0.5,
            novelty_weight: 0.3,
            authority_weight: 0.2,

            save_state: false,
            state_path: "adaptive_state.json".to_string(),

            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            n_query_variations: 10,

            embedding_coverage_radius: 0.2,
            embedding_k_exp: 3.0,
            embedding_nearest_weight: 0.7,
            embedding_top_k_weight: 0.3,
            embedding_overlap_threshold: 0.85,
            embedding_min_relative_improvement: 0.1,
            embedding_validation_min_score: 0.4,
            embedding_quality_min_confidence: 0.7,
            embedding_quality_max_confidence: 0.95,
            embedding_quality_scale_factor: 0.833,
            embedding_kb_similarity_threshold: 0.95,
        }
    }
}

impl AdaptiveConfig {
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_confidence_threshold(mut self, v: f64) -> Self {
        self.confidence_threshold = v;
        self
    }

    pub fn with_max_depth(mut self, v: u32) -> Self {
        self.max_depth = v;
        self
    }

    pub fn with_max_pages(mut self, v: u32) -> Self {
        self.max_pages = v;
        self
    }

    pub fn with_top_k_links(mut self, v: usize) -> Self {
        self.top_k_links = v;
        self
    }

    pub fn with_min_gain_threshold(mut self, v: f64) -> Self {
        self.min_gain_threshold = v;
        self
    }

    pub fn with_save_state(mut self, path: impl Into<String>) -> Self {
        self.save_state = true;
        self.state_path = path.into();
        self
    }

    /// Validate every range/consistency constraint named in the config
    /// surface. Fails fast with a message naming the offending option; runs
    /// all applicable checks rather than stopping at the first failure,
    /// except weight-sum checks, where a bad sum makes the individual
    /// component checks moot.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| -> Result<()> {
            if !(0.0..=1.0).contains(&v) {
                return Err(AdaptiveError::config(format!(
                    "{name} must be in [0,1], got {v}"
                )));
            }
            Ok(())
        };

        unit("confidence_threshold", self.confidence_threshold)?;
        if self.max_depth < 1 {
            return Err(AdaptiveError::config("max_depth must be >= 1"));
        }
        if self.max_pages < 1 {
            return Err(AdaptiveError::config("max_pages must be >= 1"));
        }
        if self.top_k_links < 1 {
            return Err(AdaptiveError::config("top_k_links must be >= 1"));
        }
        unit("min_gain_threshold", self.min_gain_threshold)?;
        unit("saturation_threshold", self.saturation_threshold)?;
        unit("consistency_threshold", self.consistency_threshold)?;

        let weight_sum = self.coverage_weight + self.consistency_weight + self.saturation_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(AdaptiveError::config(format!(
                "coverage_weight + consistency_weight + saturation_weight must sum to 1, got {weight_sum}"
            )));
        }
        let rank_weight_sum = self.relevance_weight + self.novelty_weight + self.authority_weight;
        if (rank_weight_sum - 1.0).abs() > 1e-6 {
            return Err(AdaptiveError::config(format!(
                "relevance_weight + novelty_weight + authority_weight must sum to 1, got {rank_weight_sum}"
            )));
        }

        if self.save_state && self.state_path.trim().is_empty() {
            return Err(AdaptiveError::config(
                "state_path must be non-empty when save_state is true",
            ));
        }

        if self.n_query_variations < 1 {
            return Err(AdaptiveError::config("n_query_variations must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.embedding_coverage_radius) || self.embedding_coverage_radius <= 0.0 {
            return Err(AdaptiveError::config(format!(
                "embedding_coverage_radius must be in (0,1), got {}",
                self.embedding_coverage_radius
            )));
        }
        if self.embedding_k_exp <= 0.0 {
            return Err(AdaptiveError::config("embedding_k_exp must be > 0"));
        }
        let nearest_weight_sum = self.embedding_nearest_weight + self.embedding_top_k_weight;
        if (nearest_weight_sum - 1.0).abs() > 1e-6
            || !(0.0..=1.0).contains(&self.embedding_nearest_weight)
            || !(0.0..=1.0).contains(&self.embedding_top_k_weight)
        {
            return Err(AdaptiveError::config(format!(
                "embedding_nearest_weight + embedding_top_k_weight must sum to 1 with both in [0,1], got {nearest_weight_sum}"
            )));
        }
        unit("embedding_overlap_threshold", self.embedding_overlap_threshold)?;
        if !(0.0..1.0).contains(&self.embedding_min_relative_improvement)
            || self.embedding_min_relative_improvement <= 0.0
        {
            return Err(AdaptiveError::config(format!(
                "embedding_min_relative_improvement must be in (0,1), got {}",
                self.embedding_min_relative_improvement
            )));
        }
        unit("embedding_validation_min_score", self.embedding_validation_min_score)?;
        unit(
            "embedding_quality_min_confidence",
            self.embedding_quality_min_confidence,
        )?;
        unit(
            "embedding_quality_max_confidence",
            self.embedding_quality_max_confidence,
        )?;
        if self.embedding_quality_min_confidence > self.embedding_quality_max_confidence {
            return Err(AdaptiveError::config(
                "embedding_quality_min_confidence must be <= embedding_quality_max_confidence",
            ));
        }
        if self.embedding_quality_scale_factor <= 0.0 {
            return Err(AdaptiveError::config(
                "embedding_quality_scale_factor must be > 0",
            ));
        }
        unit(
            "embedding_kb_similarity_threshold",
            self.embedding_kb_similarity_threshold,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(AdaptiveConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = AdaptiveConfig::default()
            .with_strategy(StrategyKind::Embedding)
            .with_max_pages(5)
            .with_confidence_threshold(0.3);
        assert_eq!(cfg.strategy, StrategyKind::Embedding);
        assert_eq!(cfg.max_pages, 5);
        assert_eq!(cfg.confidence_threshold, 0.3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_bad_weight_sum() {
        let mut cfg = AdaptiveConfig::default();
        cfg.coverage_weight = 0.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("coverage_weight"));
    }

    #[test]
    fn rejects_bad_rank_weight_sum() {
        let mut cfg = AdaptiveConfig::default();
        cfg.relevance_weight = 0.9;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("relevance_weight"));
    }

    #[test]
    fn rejects_zero_max_pages() {
        let mut cfg = AdaptiveConfig::default();
        cfg.max_pages = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_confidence_threshold() {
        let mut cfg = AdaptiveConfig::default();
        cfg.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inconsistent_quality_bounds() {
        let mut cfg = AdaptiveConfig::default();
        cfg.embedding_quality_min_confidence = 0.9;
        cfg.embedding_quality_max_confidence = 0.8;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_state_requires_path() {
        let mut cfg = AdaptiveConfig::default();
        cfg.save_state = true;
        cfg.state_path = "  ".to_string();
        assert!(cfg.validate().is_err());
    }
}
