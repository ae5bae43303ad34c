//! Content Sanitizer / Classifier stage: strip disallowed markup, rewrite
//! image and link URLs, classify each fragment as post or page, and extract
//! title/date metadata.

pub mod classify;
pub mod cleaner;
pub mod errors;
pub mod metadata;
pub mod types;

pub use cleaner::CleanOptions;
pub use errors::SanitizeError;
pub use types::{ContentType, ProcessedFragment};

use crate::artifacts::ArtifactStore;
use crate::fetcher::FetchedFragment;
use crate::images::RewriteMap;
use crate::pipeline::{ItemFailure, RunContentType};
use crate::profile::ClassifierRules;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Sanitize-stage tuning and run-level overrides.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub workers: usize,
    pub declared_type: RunContentType,
    /// Profile-level removal selectors unioned with run-level custom ones.
    pub remove_selectors: Vec<String>,
    pub remove_all_classes: bool,
    pub keep_ids: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            declared_type: RunContentType::Auto,
            remove_selectors: Vec::new(),
            remove_all_classes: false,
            keep_ids: false,
        }
    }
}

/// Result of the sanitize stage, one entry per input fragment.
#[derive(Debug, Default)]
pub struct SanitizeOutcome {
    pub processed: Vec<ProcessedFragment>,
    pub errors: Vec<ItemFailure>,
}

/// Sanitize and classify every fragment. Fragments are independent: the DOM
/// work runs on blocking worker threads bounded by `opts.workers`, with the
/// rewrite map as the only (read-only) shared state.
#[instrument(skip_all, fields(fragments = fragments.len(), workers = opts.workers))]
pub async fn process_all(
    fragments: Vec<FetchedFragment>,
    map: Arc<RewriteMap>,
    post_rules: Arc<ClassifierRules>,
    page_rules: Arc<ClassifierRules>,
    opts: &ProcessOptions,
    store: &ArtifactStore,
    cancel: &CancellationToken,
) -> SanitizeOutcome {
    let mut outcome = SanitizeOutcome::default();
    let semaphore = Arc::new(Semaphore::new(opts.workers.max(1)));
    let mut tasks = JoinSet::new();

    for fragment in fragments {
        if cancel.is_cancelled() {
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let map = map.clone();
        let post_rules = post_rules.clone();
        let page_rules = page_rules.clone();
        let opts = opts.clone();
        let store = store.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let source_url = fragment.source_url.clone();
            let result = tokio::task::spawn_blocking(move || {
                process_fragment(&fragment, &map, &post_rules, &page_rules, &opts)
            })
            .await
            .unwrap_or_else(|e| Err(SanitizeError::Parse(format!("worker panicked: {e}"))));

            match result {
                Ok(processed) => {
                    if let Err(e) = store.write_processed(&processed).await {
                        return (source_url, Err(SanitizeError::Parse(e.to_string())));
                    }
                    (source_url, Ok(processed))
                }
                Err(e) => (source_url, Err(e)),
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_url, Ok(processed))) => outcome.processed.push(processed),
            Ok((url, Err(e))) => outcome.errors.push(ItemFailure::new(url, e)),
            Err(e) => warn!("sanitize task panicked: {e}"),
        }
    }

    outcome.processed.sort_by(|a, b| a.source_url.cmp(&b.source_url));
    outcome.errors.sort_by(|a, b| a.item.cmp(&b.item));

    info!(
        processed = outcome.processed.len(),
        failed = outcome.errors.len(),
        "sanitize stage finished"
    );
    outcome
}

/// Classify, sanitize, and extract metadata for one fragment. Pure CPU work.
fn process_fragment(
    fragment: &FetchedFragment,
    map: &RewriteMap,
    post_rules: &ClassifierRules,
    page_rules: &ClassifierRules,
    opts: &ProcessOptions,
) -> Result<ProcessedFragment, SanitizeError> {
    let content_type = classify::classify(
        &fragment.content_html,
        opts.declared_type,
        post_rules,
        page_rules,
    );

    let rules = match content_type {
        ContentType::Post => post_rules,
        ContentType::Page => page_rules,
    };

    // Per-type content selector narrows the fragment further; a selector that
    // matches nothing leaves the fragment as fetched.
    let content_html = match rules.content_selector.as_deref() {
        Some(selector) => narrow_content(&fragment.content_html, selector)
            .unwrap_or_else(|| fragment.content_html.clone()),
        None => fragment.content_html.clone(),
    };

    let mut remove_selectors = opts.remove_selectors.clone();
    remove_selectors.extend(rules.exclude_selectors.iter().cloned());

    let clean_opts = CleanOptions {
        remove_selectors,
        remove_all_classes: opts.remove_all_classes,
        keep_ids: opts.keep_ids,
    };

    let sanitized_html =
        cleaner::clean_fragment(&content_html, &fragment.source_url, map, &clean_opts)?;

    // Metadata comes from the pre-sanitization fragment: the title or date
    // node may itself match a removal selector.
    let extracted_title =
        metadata::extract_title(&fragment.content_html, rules.title_selector.as_deref());
    let extracted_date =
        metadata::extract_date(&fragment.content_html, rules.date_selector.as_deref());

    let raw_len = fragment.content_html.len().max(1);
    let size_reduction_pct =
        (100.0 * (1.0 - sanitized_html.len() as f32 / raw_len as f32)).clamp(0.0, 100.0);

    Ok(ProcessedFragment {
        source_url: fragment.source_url.clone(),
        sanitized_html,
        content_type,
        extracted_title,
        extracted_date,
        size_reduction_pct,
    })
}

/// First subtree matching the selector with non-whitespace text, if any.
fn narrow_content(content_html: &str, selector: &str) -> Option<String> {
    use scraper::{Html, Selector};

    let selector = Selector::parse(selector).ok()?;
    let document = Html::parse_fragment(content_html);
    document
        .select(&selector)
        .find(|element| !element.text().collect::<String>().trim().is_empty())
        .map(|element| element.html())
}
