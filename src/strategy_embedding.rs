//! Vector-space implementation of the strategy contract: query-space
//! expansion against an external LLM, coverage as mean best cosine
//! similarity from training queries to the knowledge base, gap-filling
//! link selection, and a convergence stop test gated by held-out
//! validation.
//!
//! Two caches live on the strategy instance, never on `CrawlState`: a
//! link-embedding cache keyed by `hash(href + preview_text)`, and a
//! query<->KB distance matrix keyed by a content hash of `kb_embeddings`.
//! Both invalidate only on mutation of their inputs, never time-based.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, info, instrument, warn};

use crate::config::AdaptiveConfig;
use crate::error::{AdaptiveError, Result};
use crate::ports::{Embedder, FetchResult, QueryExpander};
use crate::state::{CrawlState, Link};
use crate::strategy::{CrawlStrategy, ScoredLink};
use crate::vectormath::{cosine_distance, cosine_similarity, matrix_content_hash, max_cosine_similarity, min_cosine_distance, text_key_hash};

pub struct EmbeddingStrategy {
    config: AdaptiveConfig,
    embedder: Arc<dyn Embedder>,
    query_expander: Arc<dyn QueryExpander>,

    link_embedding_cache: HashMap<String, Vec<f32>>,
    distance_matrix: Option<(String, Vec<Vec<f32>>)>,
    validation_embeddings: Option<Vec<Vec<f32>>>,
}

impl EmbeddingStrategy {
    pub fn new(embedder: Arc<dyn Embedder>, query_expander: Arc<dyn QueryExpander>) -> Self {
        EmbeddingStrategy {
            config: AdaptiveConfig::default(),
            embedder,
            query_expander,
            link_embedding_cache: HashMap::new(),
            distance_matrix: None,
            validation_embeddings: None,
        }
    }

    fn distance_matrix(&mut self, state: &CrawlState) -> &Vec<Vec<f32>> {
        let hash = matrix_content_hash(&state.kb_embeddings);
        let needs_recompute = match &self.distance_matrix {
            Some((cached_hash, _)) => cached_hash != &hash,
            None => true,
        };
        if needs_recompute {
            let matrix: Vec<Vec<f32>> = state
                .query_embeddings
                .iter()
                .map(|q| state.kb_embeddings.iter().map(|k| cosine_distance(q, k)).collect())
                .collect();
            self.distance_matrix = Some((hash, matrix));
        }
        &self.distance_matrix.as_ref().unwrap().1
    }

    fn learning_score(&mut self, state: &CrawlState) -> (f64, f64, f64) {
        if state.kb_embeddings.is_empty() || state.query_embeddings.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let best: Vec<f64> = state
            .query_embeddings
            .iter()
            .map(|q| {
                state
                    .kb_embeddings
                    .iter()
                    .map(|k| cosine_similarity(q, k) as f64)
                    .fold(f64::MIN, f64::max)
            })
            .collect();
        let mean = best.iter().sum::<f64>() / best.len() as f64;
        let median = median(&best);
        (mean, mean, median)
    }

    async fn embed_validation_queries(&mut self, state: &CrawlState) -> Result<Vec<Vec<f32>>> {
        if let Some(cached) = &self.validation_embeddings {
            return Ok(cached.clone());
        }
        if state.validation_queries.is_empty() {
            self.validation_embeddings = Some(Vec::new());
            return Ok(Vec::new());
        }
        let embeddings = self
            .embedder
            .embed(&state.validation_queries)
            .await
            .map_err(|e| AdaptiveError::EmbeddingFailure(e.to_string()))?;
        self.validation_embeddings = Some(embeddings.clone());
        Ok(embeddings)
    }

    fn build_link_scoring_text(link: &Link) -> String {
        let mut parts = Vec::new();
        if let Some(t) = &link.text {
            parts.push(t.as_str());
        }
        if let Some(t) = &link.title {
            parts.push(t.as_str());
        }
        if let Some(meta) = &link.head_meta {
            if let Some(d) = &meta.description {
                parts.push(d.as_str());
            }
        }
        parts.join(" ")
    }

    /// `quality_confidence`: a rescaled, user-facing version of the learning
    /// score gated by validation. Never drives the stop test; the adaptive
    /// loop's finalize step overwrites `metrics.confidence` with this value.
    pub fn quality_confidence(&self, state: &CrawlState, learning_score: f64) -> f64 {
        let validated = state
            .metrics
            .get("_validation_passed")
            .and_then(|m| m.as_bool())
            .unwrap_or(false);
        let val_score = state.metric_f64("validation_score").unwrap_or(0.0);

        if validated && val_score > self.config.embedding_validation_min_score {
            if learning_score < 0.4 {
                self.config.embedding_quality_min_confidence
            } else if learning_score > 0.7 {
                self.config.embedding_quality_max_confidence
            } else {
                self.config.embedding_quality_min_confidence
                    + (learning_score - 0.4) * self.config.embedding_quality_scale_factor
            }
        } else {
            learning_score * 0.8
        }
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[async_trait]
impl CrawlStrategy for EmbeddingStrategy {
    fn attach_config(&mut self, config: &AdaptiveConfig) {
        self.config = config.clone();
    }

    /// Query-space expansion, run once at digest start when not resuming.
    /// Requests `n_query_variations * 1.3` variations, keeps the original
    /// query in the training split unconditionally, and splits the rest
    /// 80/20 with a validation floor of 2.
    #[instrument(skip(self, state))]
    async fn initialize(&mut self, state: &mut CrawlState) -> Result<()> {
        let requested = ((self.config.n_query_variations as f64) * 1.3).round() as usize;
        let mut variations = self
            .query_expander
            .expand_query(&state.query, requested.max(1))
            .await
            .map_err(|e| AdaptiveError::QueryExpansionFailure(e.to_string()))?;

        state.expanded_queries = variations.clone();
        state.embedding_model = Some(self.config.embedding_model.clone());

        let mut rng = rand::thread_rng();
        variations.shuffle(&mut rng);

        let validation_count = if variations.is_empty() {
            0
        } else {
            ((variations.len() as f64 * 0.2) as usize).max(2).min(variations.len())
        };
        let split_at = variations.len() - validation_count;
        let (train_part, validation_part) = variations.split_at(split_at);

        let mut training_queries = vec![state.query.clone()];
        training_queries.extend(train_part.iter().cloned());
        state.validation_queries = validation_part.to_vec();

        let embeddings = self
            .embedder
            .embed(&training_queries)
            .await
            .map_err(|e| AdaptiveError::EmbeddingFailure(e.to_string()))?;
        state.query_embeddings = embeddings;

        info!(
            training = training_queries.len(),
            validation = state.validation_queries.len(),
            "query-space expansion complete"
        );
        Ok(())
    }

    #[instrument(skip(self, state, new_fetches))]
    async fn update_state(&mut self, state: &mut CrawlState, new_fetches: &[FetchResult]) -> Result<()> {
        let mut candidate_texts = Vec::new();
        for fetch in new_fetches {
            if !fetch.success {
                continue;
            }
            let truncated: String = fetch.markdown.chars().take(5000).collect();
            if truncated.trim().is_empty() {
                continue;
            }
            candidate_texts.push(truncated);
        }
        if candidate_texts.is_empty() {
            return Ok(());
        }

        let embeddings = self
            .embedder
            .embed(&candidate_texts)
            .await
            .map_err(|e| AdaptiveError::EmbeddingFailure(e.to_string()))?;

        let mut accepted = 0usize;
        let mut rejected = 0usize;
        for embedding in embeddings {
            let max_sim = max_cosine_similarity(&embedding, &state.kb_embeddings);
            if max_sim >= self.config.embedding_kb_similarity_threshold as f32 {
                rejected += 1;
                continue;
            }
            state.kb_embeddings.push(embedding);
            accepted += 1;
        }
        // Any mutation of kb_embeddings invalidates the cached distance matrix.
        self.distance_matrix = None;
        debug!(accepted, rejected, "embedding update_state integrated batch");
        Ok(())
    }

    fn confidence(&mut self, state: &mut CrawlState) -> Result<f64> {
        let (coverage_score, avg_best_similarity, median_best_similarity) = self.learning_score(state);
        state.set_metric("coverage_score", coverage_score);
        state.set_metric("avg_best_similarity", avg_best_similarity);
        state.set_metric("median_best_similarity", median_best_similarity);
        state.set_metric("confidence", coverage_score);
        Ok(coverage_score)
    }

    async fn rank_links(&mut self, state: &mut CrawlState, config: &AdaptiveConfig) -> Result<Vec<ScoredLink>> {
        // Step 1: gaps. If the KB is empty every gap has distance 1.0.
        let gaps: Vec<(Vec<f32>, f32)> = if state.kb_embeddings.is_empty() {
            state
                .query_embeddings
                .iter()
                .map(|q| (q.clone(), 1.0f32))
                .collect()
        } else {
            let matrix = self.distance_matrix(state).clone();
            state
                .query_embeddings
                .iter()
                .zip(matrix.iter())
                .map(|(q, row)| {
                    let min_dist = row.iter().cloned().fold(f32::MAX, f32::min);
                    (q.clone(), min_dist)
                })
                .collect()
        };
        // Snapshot this pass's gaps, per the data model's `semantic_gaps` field.
        state.semantic_gaps = gaps.clone();

        let radius = config.embedding_coverage_radius as f32;
        let needing_help: Vec<&(Vec<f32>, f32)> = gaps.iter().filter(|(_, d)| *d > radius).collect();

        // Not-previously-seen: drop already-crawled hrefs and collapse
        // duplicate hrefs within `pending_links` itself, mirroring the
        // `seen_urls` filter in the original Python implementation.
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let uncrawled: Vec<&Link> = state
            .pending_links
            .iter()
            .filter(|l| !state.crawled_urls.contains(&l.href) && seen.insert(l.href.as_str()))
            .collect();

        // Step 2: candidate embeddings, reusing the link-embedding cache.
        let mut to_embed = Vec::new();
        let mut to_embed_keys = Vec::new();
        let mut scoring_texts = HashMap::new();
        for link in &uncrawled {
            let text = Self::build_link_scoring_text(link);
            if text.trim().is_empty() {
                continue;
            }
            let key = text_key_hash(&link.href, &text);
            scoring_texts.insert(link.href.clone(), key.clone());
            if !self.link_embedding_cache.contains_key(&key) {
                to_embed.push(text);
                to_embed_keys.push(key);
            }
        }
        if !to_embed.is_empty() {
            let embedded = self
                .embedder
                .embed(&to_embed)
                .await
                .map_err(|e| AdaptiveError::EmbeddingFailure(e.to_string()))?;
            for (key, emb) in to_embed_keys.into_iter().zip(embedded.into_iter()) {
                self.link_embedding_cache.insert(key, emb);
            }
        }

        // Step 3: score.
        let overlap_threshold = config.embedding_overlap_threshold as f32;
        let mut scored: Vec<ScoredLink> = uncrawled
            .into_iter()
            .filter_map(|link| {
                let key = scoring_texts.get(&link.href)?;
                let emb = self.link_embedding_cache.get(key)?;

                let (mut sum_improvement, gaps_needing_help) = (0.0f64, needing_help.len());
                for (gap_point, gap_distance) in &needing_help {
                    let new_distance = cosine_distance(emb, gap_point);
                    if new_distance < *gap_distance {
                        sum_improvement += 2.0 * (*gap_distance - new_distance) as f64;
                    }
                }
                let gap_reduction_score = if gaps_needing_help == 0 {
                    0.0
                } else {
                    sum_improvement / gaps_needing_help as f64
                };

                let max_sim = max_cosine_similarity(emb, &state.kb_embeddings);
                let overlap_penalty = if max_sim > overlap_threshold {
                    2.0 * (max_sim - overlap_threshold) as f64
                } else {
                    0.0
                };

                let mut score = gap_reduction_score * (1.0 - overlap_penalty);
                if let Some(cs) = link.contextual_score {
                    if cs > 0.0 {
                        score = 0.8 * score + 0.2 * cs;
                    }
                }
                Some(ScoredLink { link: link.clone(), score })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored)
    }

    async fn should_stop(&mut self, state: &mut CrawlState, config: &AdaptiveConfig) -> Result<bool> {
        let (current_confidence, _, _) = self.learning_score(state);
        state.confidence_history.push(current_confidence);

        if state.crawled_urls.len() as u32 >= config.max_pages {
            state.set_metric("stopped_reason", "max_pages");
            return Ok(true);
        }
        if state.pending_links.is_empty() {
            state.set_metric("stopped_reason", "empty_frontier");
            return Ok(true);
        }

        if state.confidence_history.len() < 2 {
            return Ok(false);
        }

        let diffs: Vec<f64> = state
            .confidence_history
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .collect();
        let avg_improvement = diffs.iter().sum::<f64>() / diffs.len() as f64;

        if avg_improvement >= config.embedding_min_relative_improvement * current_confidence {
            // Still learning; keep going.
            return Ok(false);
        }

        let validation_embeddings = self.embed_validation_queries(state).await?;
        let val_score = if validation_embeddings.is_empty() {
            0.0
        } else {
            let k_exp = config.embedding_k_exp;
            let scores: Vec<f64> = validation_embeddings
                .iter()
                .map(|v| {
                    let min_dist = min_cosine_distance(v, &state.kb_embeddings) as f64;
                    (-k_exp * min_dist).exp()
                })
                .collect();
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        state.set_metric("validation_score", val_score);

        if val_score > config.embedding_validation_min_score {
            state.set_metric("stopped_reason", "converged_validated");
            state.set_metric("_validation_passed", true);
            Ok(true)
        } else {
            state.set_metric("stopped_reason", "low_validation");
            state.set_metric("_validation_passed", false);
            warn!(val_score, "learning curve plateaued without validated coverage");
            Ok(false)
        }
    }

    fn finalize_confidence(&self, state: &CrawlState, raw_confidence: f64) -> f64 {
        self.quality_confidence(state, raw_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::{hash_embed, HashEmbedder, ScriptedExpander};
    use crate::state::CrawlState;

    fn strategy() -> EmbeddingStrategy {
        EmbeddingStrategy::new(Arc::new(HashEmbedder::new(8)), Arc::new(ScriptedExpander::new(vec![])))
    }

    #[tokio::test]
    async fn initialize_splits_validation_with_floor_of_two() {
        let mut state = CrawlState::new("alpha beta");
        let expander = ScriptedExpander::new(
            (0..10).map(|i| format!("variant {i}")).collect(),
        );
        let mut strat = EmbeddingStrategy::new(Arc::new(HashEmbedder::new(8)), Arc::new(expander));
        strat.attach_config(&AdaptiveConfig::default());
        strat.initialize(&mut state).await.unwrap();

        assert!(state.validation_queries.len() >= 2);
        assert_eq!(
            state.query_embeddings.len(),
            1 + (state.expanded_queries.len() - state.validation_queries.len())
        );
    }

    #[tokio::test]
    async fn validation_split_truncates_rather_than_rounds() {
        // 13 variations * 0.2 = 2.6: truncation gives 2, rounding would give 3.
        // This is the case `initialize_splits_validation_with_floor_of_two`
        // (10 variations, an already-integral 10*0.2=2.0) cannot distinguish.
        let mut state = CrawlState::new("alpha beta");
        let expander = ScriptedExpander::new((0..13).map(|i| format!("variant {i}")).collect());
        let mut strat = EmbeddingStrategy::new(Arc::new(HashEmbedder::new(8)), Arc::new(expander));
        strat.attach_config(&AdaptiveConfig::default());
        strat.initialize(&mut state).await.unwrap();

        assert_eq!(state.validation_queries.len(), 2);
    }

    #[tokio::test]
    async fn confidence_zero_with_empty_kb() {
        let mut state = CrawlState::new("q");
        let mut strat = strategy();
        assert_eq!(strat.confidence(&mut state).unwrap(), 0.0);
    }

    #[tokio::test]
    async fn update_state_deduplicates_near_identical_documents() {
        let mut state = CrawlState::new("q");
        let mut strat = strategy();
        strat.attach_config(&AdaptiveConfig::default());

        let fetch_a = FetchResult {
            success: true,
            url: "https://a".into(),
            markdown: "the quick brown fox jumps".into(),
            links: Default::default(),
            metadata: Default::default(),
        };
        let fetch_b = FetchResult {
            success: true,
            url: "https://b".into(),
            markdown: "the quick brown fox jumps".into(),
            links: Default::default(),
            metadata: Default::default(),
        };
        strat.update_state(&mut state, &[fetch_a]).await.unwrap();
        strat.update_state(&mut state, &[fetch_b]).await.unwrap();
        assert_eq!(state.kb_embeddings.len(), 1);
    }

    #[test]
    fn quality_confidence_uses_min_band_below_0_4() {
        let state = CrawlState::new("q");
        let strat = strategy();
        let q = strat.quality_confidence(&state, 0.3);
        assert_eq!(q, 0.3 * 0.8);
    }

    #[test]
    fn median_of_even_length_averages_middle_two() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }

    #[test]
    fn hash_embed_is_deterministic() {
        let a = hash_embed("hello world", 8);
        let b = hash_embed("hello world", 8);
        assert_eq!(a, b);
    }
}
