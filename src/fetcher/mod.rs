//! Content Fetcher stage: retrieve pages, extract the content fragment per
//! the profile's selector chain, and persist one artifact per URL.

pub mod client;
pub mod decode;
pub mod errors;
pub mod extract;
pub mod types;

pub use errors::FetchError;
pub use types::{Charset, FetchedFragment, PageResponse};

use crate::artifacts::ArtifactStore;
use crate::backoff::retry_delay;
use crate::pipeline::ItemFailure;
use crate::profile::SelectorChain;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use url::Url;

/// Fetch-stage tuning, resolved from [`crate::config::Config`] by the caller.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Parallel fetches. 1 means strictly sequential (the default, to avoid
    /// tripping target-site rate limits).
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

/// Result of the fetch stage. Every input URL is accounted for exactly once:
/// `fragments.len() + errors.len()` equals the number of unique input URLs.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub fragments: Vec<FetchedFragment>,
    pub errors: Vec<ItemFailure>,
}

/// Fetch every URL, extract content via the selector chain, and persist one
/// artifact per success. Item failures are recorded, never propagated.
#[instrument(skip_all, fields(urls = urls.len(), concurrency = opts.concurrency))]
pub async fn fetch_all(
    urls: &[String],
    chain: &SelectorChain,
    store: &ArtifactStore,
    opts: &FetchOptions,
    cancel: &CancellationToken,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();

    // Dedupe while preserving first-seen order.
    let mut seen = HashSet::new();
    let unique: Vec<&String> = urls.iter().filter(|u| seen.insert(u.as_str())).collect();

    if opts.concurrency <= 1 {
        for url in unique {
            if cancel.is_cancelled() {
                info!("fetch cancelled, remaining urls not started");
                break;
            }
            match fetch_one(url, chain, store, opts).await {
                Ok(fragment) => outcome.fragments.push(fragment),
                Err(e) => outcome.errors.push(ItemFailure::new(url.clone(), e)),
            }
        }
    } else {
        let semaphore = Arc::new(Semaphore::new(opts.concurrency));
        let mut tasks = JoinSet::new();

        for url in unique {
            if cancel.is_cancelled() {
                break;
            }
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let url = url.clone();
            let chain = chain.clone();
            let store = store.clone();
            let opts = opts.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = fetch_one(&url, &chain, &store, &opts).await;
                (url, result)
            });
        }

        // Results arrive in completion order; merging is keyed by URL so the
        // aggregate is order-independent.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_url, Ok(fragment))) => outcome.fragments.push(fragment),
                Ok((url, Err(e))) => outcome.errors.push(ItemFailure::new(url, e)),
                Err(e) => warn!("fetch task panicked: {e}"),
            }
        }
    }

    // Deterministic downstream order regardless of completion order.
    outcome.fragments.sort_by(|a, b| a.source_url.cmp(&b.source_url));
    outcome.errors.sort_by(|a, b| a.item.cmp(&b.item));

    info!(
        fetched = outcome.fragments.len(),
        failed = outcome.errors.len(),
        "fetch stage finished"
    );
    outcome
}

/// Fetch a single URL with retry/backoff, then extract its content fragment
/// and persist the artifact.
async fn fetch_one(
    url: &str,
    chain: &SelectorChain,
    store: &ArtifactStore,
    opts: &FetchOptions,
) -> Result<FetchedFragment, FetchError> {
    let parsed = Url::parse(url)?;
    let response = fetch_with_retry(&parsed, opts).await?;

    let content_html = extract::extract_content(&response.body_utf8, &response.url_final, chain)?;

    let fragment = FetchedFragment {
        source_url: parsed,
        raw_html: response.body_utf8,
        content_html,
        fetched_at: response.fetched_at,
    };

    store
        .write_fragment(&fragment)
        .await
        .map_err(|e| FetchError::Io(e.to_string()))?;

    Ok(fragment)
}

async fn fetch_with_retry(url: &Url, opts: &FetchOptions) -> Result<PageResponse, FetchError> {
    let mut attempt: u32 = 0;
    loop {
        match client::fetch_page(url, None).await {
            Ok(response) => return Ok(response),
            Err(e) if e.should_retry() && attempt < opts.max_retries => {
                let delay = retry_delay(attempt, opts.backoff_ms);
                warn!(
                    url = %url,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying fetch after error: {e}"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
