//! Content extraction: apply a profile's selector chain to a decoded page.

use crate::fetcher::errors::FetchError;
use crate::profile::SelectorChain;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Apply the selector chain in order; the first selector whose matched
/// subtree has non-whitespace text wins. When nothing matches, fall back to a
/// readability pass over the whole document.
pub fn extract_content(html: &str, url: &Url, chain: &SelectorChain) -> Result<String, FetchError> {
    let document = Html::parse_document(html);

    for selector_str in chain.effective() {
        // Profiles are validated at load time; a parse failure here means a
        // built-in default is broken, so skipping is the only sane move.
        let Ok(selector) = Selector::parse(&selector_str) else {
            continue;
        };
        for element in document.select(&selector) {
            let text = element.text().collect::<String>();
            if !text.trim().is_empty() {
                debug!(selector = %selector_str, "selector matched content");
                return Ok(element.html());
            }
        }
    }

    debug!(url = %url, "no selector matched, trying readability fallback");
    whole_document_fallback(html, url)
}

/// Heuristic strip of the whole document when no configured selector matches.
fn whole_document_fallback(html: &str, url: &Url) -> Result<String, FetchError> {
    if let Ok(article) = readability::extractor::extract(&mut html.as_bytes(), url)
        && !article.text.trim().is_empty()
    {
        return Ok(article.content);
    }

    Err(FetchError::EmptyContent)
}
