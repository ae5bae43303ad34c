//! Run-scoped types: the fully-resolved run request, per-stage failure
//! ledger, progress snapshots, and the final summary.

use crate::profile::{SelectorChain, SiteProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One failed item (URL, image URL, or artifact filename) with its message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: String,
    pub message: String,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, message: impl ToString) -> Self {
        Self {
            item: item.into(),
            message: message.to_string(),
        }
    }
}

/// Append-only per-stage failure lists. Never cleared during a run; the final
/// summary reports every entry even when the run completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunFailures {
    pub fetch: Vec<ItemFailure>,
    pub images: Vec<ItemFailure>,
    pub sanitize: Vec<ItemFailure>,
    pub generate: Vec<ItemFailure>,
}

impl RunFailures {
    pub fn total(&self) -> usize {
        self.fetch.len() + self.images.len() + self.sanitize.len() + self.generate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Content type declared for a run, or automatic per-fragment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunContentType {
    Post,
    Page,
    #[default]
    Auto,
}

/// A fully-resolved run request. All skip/override decisions are made by the
/// caller before invoking the pipeline; the core never prompts mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub urls: Vec<String>,
    #[serde(default)]
    pub profile: Option<SiteProfile>,
    #[serde(default)]
    pub content_type: RunContentType,
    #[serde(default)]
    pub bypass_images: bool,
    #[serde(default)]
    pub custom_selectors: Option<SelectorChain>,
    #[serde(default)]
    pub custom_remove_selectors: Vec<String>,
    /// Strip every class attribute instead of keeping the layout allowlist.
    #[serde(default)]
    pub remove_all_classes: bool,
    /// Keep `id` attributes (stripped by default).
    #[serde(default)]
    pub keep_ids: bool,
    #[serde(default)]
    pub skip_fetch: bool,
    #[serde(default)]
    pub skip_images: bool,
    #[serde(default)]
    pub skip_sanitize: bool,
    #[serde(default)]
    pub skip_generate: bool,
}

impl RunRequest {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            profile: None,
            content_type: RunContentType::Auto,
            bypass_images: false,
            custom_selectors: None,
            custom_remove_selectors: Vec::new(),
            remove_all_classes: false,
            keep_ids: false,
            skip_fetch: false,
            skip_images: false,
            skip_sanitize: false,
            skip_generate: false,
        }
    }
}

/// Run lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Fetching,
    Imaging,
    Processing,
    Generating,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Mid-run progress snapshot, polled by the surrounding run-tracking store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    pub urls_scraped: usize,
    pub images_downloaded: usize,
    pub files_processed: usize,
}

/// Final counters for a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub urls_scraped: usize,
    pub urls_failed: usize,
    pub images_downloaded: usize,
    pub images_failed: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub posts_detected: usize,
    pub pages_detected: usize,
    pub total_duration_ms: u64,
    pub error_count: usize,
}

/// Everything the caller gets back from a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub metrics: RunMetrics,
    pub failures: RunFailures,
    /// Structured cause when `status` is `Failed`.
    pub failure_cause: Option<String>,
    /// Generated import files, empty unless the run reached generation.
    pub export_files: Vec<std::path::PathBuf>,
}

/// Per-stage counts of durable artifacts already present, exposed so an
/// interactive caller can decide on skip flags before starting the run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingArtifacts {
    pub fetched: usize,
    pub images: usize,
    pub sanitized: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_request_minimal_json() {
        let request: RunRequest =
            serde_json::from_str(r#"{"urls": ["https://example.com/a"]}"#).unwrap();
        assert_eq!(request.urls.len(), 1);
        assert_eq!(request.content_type, RunContentType::Auto);
        assert!(!request.bypass_images);
        assert!(!request.skip_fetch);
    }

    #[test]
    fn run_request_full_json() {
        let request: RunRequest = serde_json::from_str(
            r#"{
                "urls": ["https://example.com/a"],
                "contentType": "post",
                "bypassImages": true,
                "customRemoveSelectors": [".promo"],
                "removeAllClasses": true,
                "keepIds": true,
                "skipFetch": true
            }"#,
        )
        .unwrap();
        assert_eq!(request.content_type, RunContentType::Post);
        assert!(request.bypass_images);
        assert!(request.skip_fetch);
        assert!(request.remove_all_classes);
        assert!(request.keep_ids);
        assert_eq!(request.custom_remove_selectors, vec![".promo".to_string()]);
    }

    #[test]
    fn terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Fetching.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }

    #[test]
    fn failures_accumulate_across_stages() {
        let mut failures = RunFailures::default();
        failures.fetch.push(ItemFailure::new("https://a", "timeout"));
        failures.images.push(ItemFailure::new("https://b.jpg", "404"));
        assert_eq!(failures.total(), 2);
        assert!(!failures.is_empty());
    }
}
