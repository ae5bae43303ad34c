use serde::{Deserialize, Serialize};
use url::Url;

/// WordPress-side content type of a migrated fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Page,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Page => "page",
        }
    }
}

/// Sanitized, classified output for one fragment: the durable artifact of the
/// processing stage, one-to-one with its [`crate::fetcher::FetchedFragment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFragment {
    pub source_url: Url,
    pub sanitized_html: String,
    pub content_type: ContentType,
    pub extracted_title: Option<String>,
    pub extracted_date: Option<String>,
    /// `100 * (1 - sanitized/raw)`, clamped to 0..=100. Diagnostics only.
    pub size_reduction_pct: f32,
}
