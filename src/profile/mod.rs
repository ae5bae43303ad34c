//! Site profiles: reusable extraction/classification/removal/image rule
//! bundles created by the dashboard and read-only to the pipeline.
//!
//! Profiles arrive as JSON. Every selector is parsed once at load time so a
//! typo fails the run up front instead of halfway through a 500-page scrape.

use scraper::Selector;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Built-in selector chain used when a profile has no extraction selectors
/// (or no profile is supplied at all). Ordered from most to least specific.
pub const DEFAULT_SELECTOR_CHAIN: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    ".entry-content",
    ".content",
    "#content",
    ".post",
    "#main",
];

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("invalid selector '{selector}' in {field}")]
    InvalidSelector { field: &'static str, selector: String },

    #[error("profile file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Named bundle of extraction/removal/image rules for one target site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteProfile {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub extraction: SelectorChain,
    #[serde(default)]
    pub post_rules: ClassifierRules,
    #[serde(default)]
    pub page_rules: ClassifierRules,
    #[serde(default)]
    pub remove_selectors: Vec<String>,
    #[serde(default)]
    pub image_policy: ImagePolicy,
}

impl SiteProfile {
    /// Load a profile from a JSON file and validate every selector in it.
    pub fn load(path: &std::path::Path) -> Result<Self, ProfileError> {
        let raw = std::fs::read_to_string(path)?;
        let profile: Self = serde_json::from_str(&raw)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Parse every configured selector once, rejecting the profile if any is
    /// malformed.
    pub fn validate(&self) -> Result<(), ProfileError> {
        check_all("extraction", self.extraction.selectors())?;
        check_all("removeSelectors", &self.remove_selectors)?;
        self.post_rules.validate("postRules")?;
        self.page_rules.validate("pageRules")?;
        Ok(())
    }
}

/// Ordered list of CSS selectors tried in sequence; first selector matching
/// non-whitespace content wins. An empty chain means "use the default chain".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorChain(Vec<String>);

impl SelectorChain {
    pub fn new(selectors: Vec<String>) -> Self {
        Self(selectors)
    }

    pub fn selectors(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The selectors to actually try: the configured chain, or the built-in
    /// default chain when none are configured.
    pub fn effective(&self) -> Vec<String> {
        if self.0.is_empty() {
            DEFAULT_SELECTOR_CHAIN.iter().map(|s| s.to_string()).collect()
        } else {
            self.0.clone()
        }
    }
}

impl From<Vec<String>> for SelectorChain {
    fn from(selectors: Vec<String>) -> Self {
        Self(selectors)
    }
}

/// Per-content-type extraction and classification rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierRules {
    #[serde(default)]
    pub content_selector: Option<String>,
    #[serde(default)]
    pub date_selector: Option<String>,
    #[serde(default)]
    pub title_selector: Option<String>,
    #[serde(default)]
    pub exclude_selectors: Vec<String>,
    #[serde(default)]
    pub type_selectors: Option<TypeSelectors>,
}

impl ClassifierRules {
    fn validate(&self, field: &'static str) -> Result<(), ProfileError> {
        for sel in [
            &self.content_selector,
            &self.date_selector,
            &self.title_selector,
        ]
        .into_iter()
        .flatten()
        {
            check_one(field, sel)?;
        }
        check_all(field, &self.exclude_selectors)?;
        if let Some(ts) = &self.type_selectors {
            check_one(field, &ts.post)?;
            check_one(field, &ts.page)?;
        }
        Ok(())
    }
}

/// Discriminator selectors for heuristic post/page classification. A fragment
/// matching only `post` is a post, only `page` is a page; ties fall through to
/// structural heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSelectors {
    pub post: String,
    pub page: String,
}

/// Image download/transcode policy for one site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_convert_avif: bool,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            allowed_formats: default_allowed_formats(),
            auto_convert_avif: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_concurrent() -> usize {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_allowed_formats() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn check_all(field: &'static str, selectors: &[String]) -> Result<(), ProfileError> {
    for sel in selectors {
        check_one(field, sel)?;
    }
    Ok(())
}

fn check_one(field: &'static str, selector: &str) -> Result<(), ProfileError> {
    Selector::parse(selector).map_err(|_| ProfileError::InvalidSelector {
        field,
        selector: selector.to_string(),
    })?;
    Ok(())
}
