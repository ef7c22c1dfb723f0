//! Pure term-statistics implementation of the strategy contract: coverage,
//! consistency and saturation confidence; BM25-ish (relevance + novelty +
//! authority) link ranking; a threshold-based stop test. No embedder, no
//! LLM — this strategy never calls an external collaborator.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::config::AdaptiveConfig;
use crate::error::Result;
use crate::ports::FetchResult;
use crate::state::{CrawlState, Link};
use crate::strategy::{CrawlStrategy, ScoredLink};
use crate::tokenizer::tokenize;

/// Term-statistics strategy. Holds its own copy of the weight/threshold
/// portion of config because the `confidence` method in the shared contract
/// does not take a config parameter — config is attached once at setup
/// (`attach_config`), mirroring "Strategy setup: attach config to strategy"
/// in the adaptive loop's init procedure.
#[derive(Debug, Clone)]
pub struct StatisticalStrategy {
    config: AdaptiveConfig,
}

impl Default for StatisticalStrategy {
    fn default() -> Self {
        StatisticalStrategy::new()
    }
}

impl StatisticalStrategy {
    pub fn new() -> Self {
        StatisticalStrategy {
            config: AdaptiveConfig::default(),
        }
    }

    fn coverage(state: &CrawlState) -> f64 {
        if state.knowledge_base.is_empty() {
            return 0.0;
        }
        let query_tokens: HashSet<String> =
            tokenize(&state.query.to_lowercase()).into_iter().collect();
        if query_tokens.is_empty() {
            return 0.0;
        }
        let max_tf = state
            .term_frequencies
            .values()
            .copied()
            .max()
            .unwrap_or(1)
            .max(1);

        let term_scores: Vec<f64> = query_tokens
            .iter()
            .map(|q| {
                let df = state.document_frequencies.get(q).copied().unwrap_or(0);
                let tf = state.term_frequencies.get(q).copied().unwrap_or(0);
                let doc_cov = if state.total_documents > 0 {
                    df as f64 / state.total_documents as f64
                } else {
                    0.0
                };
                let freq_signal = if max_tf == 0 {
                    0.0
                } else {
                    ((1.0 + tf as f64).ln()) / ((1.0 + max_tf as f64).ln())
                };
                doc_cov * (1.0 + 0.5 * freq_signal)
            })
            .collect();

        let mean = term_scores.iter().sum::<f64>() / term_scores.len() as f64;
        mean.max(0.0).sqrt().min(1.0)
    }

    fn consistency(state: &CrawlState) -> f64 {
        if state.knowledge_base.len() < 2 {
            return 1.0;
        }
        let token_sets: Vec<HashSet<String>> = state
            .knowledge_base
            .iter()
            .map(|d| tokenize(&d.markdown.to_lowercase()).into_iter().collect())
            .collect();

        let mut total = 0.0;
        let mut pairs = 0usize;
        for i in 0..token_sets.len() {
            for j in (i + 1)..token_sets.len() {
                // Skip pairs where either document tokenizes to nothing:
                // they carry no topical signal and must not be counted,
                // rather than contributing a vacuous jaccard of 1.0.
                if token_sets[i].is_empty() && token_sets[j].is_empty() {
                    continue;
                }
                total += jaccard(&token_sets[i], &token_sets[j]);
                pairs += 1;
            }
        }
        if pairs == 0 {
            1.0
        } else {
            total / pairs as f64
        }
    }

    fn saturation(state: &CrawlState) -> f64 {
        if state.new_terms_history.len() < 2 {
            return 0.0;
        }
        let r0 = (*state.new_terms_history.first().unwrap()).max(1) as f64;
        let r_l = (*state.new_terms_history.last().unwrap()).max(1) as f64;
        (1.0 - r_l / r0).clamp(0.0, 1.0)
    }

    fn relevance(query_tokens: &HashSet<String>, link: &Link) -> f64 {
        if let Some(cs) = link.contextual_score {
            if cs > 0.0 {
                return cs;
            }
        }
        let text = link.scoring_text().to_lowercase();
        if text.is_empty() || query_tokens.is_empty() {
            return 0.0;
        }
        let link_tokens: HashSet<String> = tokenize(&text).into_iter().collect();
        let overlap = query_tokens.intersection(&link_tokens).count();
        overlap as f64 / query_tokens.len() as f64
    }

    fn novelty(known_terms: &HashSet<&String>, link: &Link) -> f64 {
        let text = link.scoring_text().to_lowercase();
        if text.is_empty() {
            return 0.5;
        }
        let link_tokens: HashSet<String> = tokenize(&text).into_iter().collect();
        if link_tokens.is_empty() {
            return 0.5;
        }
        let novel = link_tokens.iter().filter(|t| !known_terms.contains(t)).count();
        novel as f64 / link_tokens.len() as f64
    }

    fn authority(link: &Link) -> f64 {
        let href = link.href.to_lowercase();
        let mut base = 0.5f64;
        for marker in ["/docs/", "/api/", "/reference/"] {
            if href.contains(marker) {
                base += 0.2;
            }
        }
        if href.contains("/guide/") || href.contains("/tutorial/") {
            base += 0.1;
        }
        if href.ends_with(".pdf") {
            base += 0.1;
        }
        for ext in [".jpg", ".png", ".gif"] {
            if href.ends_with(ext) {
                base -= 0.3;
            }
        }
        base = base.clamp(0.0, 1.0);

        if let Some(intrinsic) = link.intrinsic_score {
            (0.7 * base + 0.3 * intrinsic).clamp(0.0, 1.0)
        } else {
            base
        }
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[async_trait]
impl CrawlStrategy for StatisticalStrategy {
    fn attach_config(&mut self, config: &AdaptiveConfig) {
        self.config = config.clone();
    }

    #[instrument(skip(self, state, new_fetches))]
    async fn update_state(&mut self, state: &mut CrawlState, new_fetches: &[FetchResult]) -> Result<()> {
        for fetch in new_fetches {
            if !fetch.success {
                continue;
            }
            let text = fetch.markdown.to_lowercase();
            let tokens = tokenize(&text);
            let term_set: HashSet<String> = tokens.iter().cloned().collect();

            for t in &tokens {
                *state.term_frequencies.entry(t.clone()).or_insert(0) += 1;
            }

            let vocab_before = state.document_frequencies.len();
            // The document's own index in the knowledge base: it was already
            // appended by the driver before calling into the strategy.
            let doc_index = state
                .knowledge_base
                .iter()
                .position(|d| d.url == fetch.url)
                .unwrap_or(state.knowledge_base.len().saturating_sub(1));

            for t in &term_set {
                let set = state.documents_with_terms.entry(t.clone()).or_default();
                if set.insert(doc_index) {
                    *state.document_frequencies.entry(t.clone()).or_insert(0) += 1;
                }
            }
            let vocab_after = state.document_frequencies.len();
            let delta = (vocab_after - vocab_before) as u64;
            state.new_terms_history.push(delta);
        }
        Ok(())
    }

    fn confidence(&mut self, state: &mut CrawlState) -> Result<f64> {
        let coverage = Self::coverage(state);
        let consistency = Self::consistency(state);
        let saturation = Self::saturation(state);
        state.set_metric("coverage", coverage);
        state.set_metric("consistency", consistency);
        state.set_metric("saturation", saturation);

        let confidence = self.config.coverage_weight * coverage
            + self.config.consistency_weight * consistency
            + self.config.saturation_weight * saturation;
        state.set_metric("confidence", confidence);
        debug!(coverage, consistency, saturation, confidence, "statistical confidence computed");
        Ok(confidence)
    }

    async fn rank_links(&mut self, state: &mut CrawlState, config: &AdaptiveConfig) -> Result<Vec<ScoredLink>> {
        let query_tokens: HashSet<String> =
            tokenize(&state.query.to_lowercase()).into_iter().collect();
        let known_terms: HashSet<&String> = state.term_frequencies.keys().collect();

        let mut scored: Vec<ScoredLink> = state
            .pending_links
            .iter()
            .filter(|l| !state.crawled_urls.contains(&l.href))
            .enumerate()
            .map(|(order, link)| {
                let relevance = Self::relevance(&query_tokens, link);
                let novelty = Self::novelty(&known_terms, link);
                let authority = Self::authority(link);
                let score = config.relevance_weight * relevance
                    + config.novelty_weight * novelty
                    + config.authority_weight * authority;
                (order, ScoredLink { link: link.clone(), score })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(_, s)| s)
            .collect();

        // Stable sort descending by score; ties keep original pending order
        // because `sort_by` is stable and we never reordered before this.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored)
    }

    async fn should_stop(&mut self, state: &mut CrawlState, config: &AdaptiveConfig) -> Result<bool> {
        let confidence = state.metric_f64("confidence").unwrap_or(0.0);
        let saturation = state.metric_f64("saturation").unwrap_or(0.0);
        let stop = confidence >= config.confidence_threshold
            || state.crawled_urls.len() as u32 >= config.max_pages
            || state.pending_links.is_empty()
            || saturation >= config.saturation_threshold;
        if stop {
            let reason = if confidence >= config.confidence_threshold {
                "confidence_threshold"
            } else if state.crawled_urls.len() as u32 >= config.max_pages {
                "max_pages"
            } else if state.pending_links.is_empty() {
                "empty_frontier"
            } else {
                "saturation_threshold"
            };
            state.set_metric("stopped_reason", reason);
        }
        Ok(stop)
    }
}
