//! The adaptive loop: the orchestrator that drives a `CrawlStrategy` to
//! completion. Initializes or resumes state, performs the seed crawl, then
//! repeatedly ranks, fetches, and integrates until one of the strategy's
//! stop conditions fires or the iteration budget is exhausted.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::AdaptiveConfig;
use crate::error::Result;
use crate::persistence;
use crate::ports::{FetchResult, Fetcher};
use crate::state::{CrawlState, Document};
use crate::strategy::CrawlStrategy;

/// Drive `strategy` from `start_url`/`query` to completion (or resume a
/// prior run from `resume_path`), returning the final state.
///
/// This is the crate's single entry point; it owns no state of its own
/// beyond the fetcher and config passed in, matching the "global state: none"
/// design note — per-run caches live on the strategy instance the caller
/// constructed and passed in.
#[instrument(skip(fetcher, strategy), fields(start_url, query))]
pub async fn digest(
    fetcher: Arc<dyn Fetcher>,
    config: AdaptiveConfig,
    mut strategy: Box<dyn CrawlStrategy>,
    start_url: &str,
    query: &str,
    resume_path: Option<&Path>,
) -> Result<CrawlState> {
    config.validate()?;
    url::Url::parse(start_url).map_err(|e| {
        crate::error::AdaptiveError::config(format!("start_url {start_url:?} is not a valid URL: {e}"))
    })?;
    strategy.attach_config(&config);

    let resuming = resume_path.is_some();
    let mut state = match resume_path {
        Some(path) => {
            let mut loaded = persistence::load(path).await?;
            loaded.query = query.to_string();
            loaded
        }
        None => CrawlState::new(query),
    };

    if !resuming {
        strategy.initialize(&mut state).await?;
    }

    if !state.crawled_urls.contains(start_url) {
        match fetcher.fetch(start_url, query).await {
            Ok(result) if result.success => {
                integrate_fetch(&mut state, &result);
                state.filter_crawled_pending();
                strategy
                    .update_state(&mut state, std::slice::from_ref(&result))
                    .await?;
            }
            Ok(_) => warn!(url = start_url, "seed fetch unsuccessful, starting with empty frontier"),
            Err(e) => warn!(url = start_url, error = %e, "seed fetch failed, starting with empty frontier"),
        }
    }

    for iteration in 0..config.max_depth {
        let conf = strategy.confidence(&mut state)?;
        state.set_metric("confidence", conf);

        if strategy.should_stop(&mut state, &config).await? {
            info!(iteration, "stopping: strategy should_stop returned true");
            break;
        }

        let ranked = strategy.rank_links(&mut state, &config).await?;
        if ranked.is_empty() {
            info!(iteration, "stopping: empty frontier after ranking");
            break;
        }
        if ranked[0].score < config.min_gain_threshold {
            info!(iteration, score = ranked[0].score, "stopping: top ranked link below min_gain_threshold");
            break;
        }

        let to_fetch: Vec<_> = ranked
            .into_iter()
            .filter(|s| !state.crawled_urls.contains(&s.link.href))
            .take(config.top_k_links)
            .collect();
        if to_fetch.is_empty() {
            info!(iteration, "stopping: no unvisited links left in the ranking");
            break;
        }

        let fetch_futures = to_fetch.iter().map(|scored| {
            let href = scored.link.href.clone();
            let fetcher = fetcher.clone();
            async move {
                let outcome = fetcher.fetch(&href, query).await;
                (href, outcome)
            }
        });
        let fetched = futures::future::join_all(fetch_futures).await;

        let mut successes = Vec::new();
        for (href, outcome) in fetched {
            match outcome {
                Ok(result) if result.success => successes.push(result),
                Ok(_) => warn!(url = %href, "fetch unsuccessful, skipping"),
                Err(e) => warn!(url = %href, error = %e, "fetch failed, skipping"),
            }
        }

        for result in &successes {
            integrate_fetch(&mut state, result);
        }
        state.filter_crawled_pending();
        strategy.update_state(&mut state, &successes).await?;

        state.depth_reached = iteration as usize + 1;

        if config.save_state {
            persistence::save(&state, Path::new(&config.state_path)).await.ok();
        }
    }

    let raw_confidence = strategy.confidence(&mut state)?;
    let final_confidence = strategy.finalize_confidence(&state, raw_confidence);
    state.set_metric("confidence", final_confidence);
    state.pages_crawled = state.crawled_urls.len();

    if config.save_state {
        persistence::save(&state, Path::new(&config.state_path)).await.ok();
    }

    Ok(state)
}

/// Append a successful fetch into the knowledge base and bookkeeping sets
/// owned by the loop: `knowledge_base`, `crawled_urls`, `crawl_order`,
/// `total_documents`, and `pending_links`. Kept as shared loop-level
/// bookkeeping (rather than each strategy's `update_state`) so invariant 1
/// (`len(knowledge_base) == total_documents == len(crawl_order)`) holds
/// regardless of what a strategy's own scratch-space update does (the
/// embedding strategy's KB-embedding dedup, for instance, must not also
/// shrink `crawl_order`).
///
/// Only appends a link whose href is neither already crawled nor already
/// sitting in `pending_links`: two pages linking to the same uncrawled URL
/// must not produce two frontier entries for it, which would otherwise let
/// the same href be ranked, selected, and fetched twice in one batch and
/// double-counted into `knowledge_base`/`crawl_order`.
fn integrate_fetch(state: &mut CrawlState, result: &FetchResult) {
    state.knowledge_base.push(Document {
        url: result.url.clone(),
        markdown: result.markdown.clone(),
        links: result.links.clone(),
        metadata: result.metadata.clone(),
    });
    state.crawled_urls.insert(result.url.clone());
    state.crawl_order.push(result.url.clone());
    state.total_documents = state.knowledge_base.len();

    let mut pending_hrefs: std::collections::HashSet<String> =
        state.pending_links.iter().map(|l| l.href.clone()).collect();
    for link in result.links.internal.iter().chain(result.links.external.iter()) {
        if !state.crawled_urls.contains(&link.href) && pending_hrefs.insert(link.href.clone()) {
            state.pending_links.push(link.clone());
        }
    }
}

/// True if the run produced an answer its own strategy considers adequate:
/// for the embedding strategy, whether the held-out validation probe passed
/// during the run; for the statistical strategy, whether the final
/// confidence met `confidence_threshold`. A one-line derived fact about the
/// returned state, not a reporting subsystem.
pub fn is_sufficient(state: &CrawlState, config: &AdaptiveConfig) -> bool {
    if let Some(passed) = state.metrics.get("_validation_passed").and_then(|m| m.as_bool()) {
        return passed;
    }
    state.metric_f64("confidence").unwrap_or(0.0) >= config.confidence_threshold
}

/// Rank knowledge-base documents by simple query term overlap and return
/// the top `k` `(url, score)` pairs.
pub fn top_relevant(state: &CrawlState, k: usize) -> Vec<(String, f64)> {
    let query_tokens: std::collections::HashSet<String> =
        crate::tokenizer::tokenize(&state.query.to_lowercase()).into_iter().collect();
    if query_tokens.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(String, f64)> = state
        .knowledge_base
        .iter()
        .map(|doc| {
            let doc_tokens: std::collections::HashSet<String> =
                crate::tokenizer::tokenize(&doc.markdown.to_lowercase()).into_iter().collect();
            let overlap = query_tokens.intersection(&doc_tokens).count();
            let score = overlap as f64 / query_tokens.len() as f64;
            (doc.url.clone(), score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}
