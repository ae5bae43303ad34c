//! Image reference collection: every `img` URL mentioned by any fragment,
//! resolved absolute and deduplicated.

use crate::fetcher::FetchedFragment;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Attributes that can carry an image URL. Lazy-loading themes stash the real
/// URL in data attributes and leave a placeholder in `src`.
const IMAGE_ATTRS: &[&str] = &["src", "data-src", "data-original", "data-lazy-src", "data-full"];

/// Collect every unique image URL referenced across all fragments. An image
/// referenced by N fragments appears once. Returned sorted, so downstream
/// scheduling is deterministic.
pub fn collect_image_urls(fragments: &[FetchedFragment]) -> Vec<Url> {
    let mut unique = BTreeSet::new();
    let img_selector = Selector::parse("img").expect("static selector");

    for fragment in fragments {
        let document = Html::parse_fragment(&fragment.content_html);

        for element in document.select(&img_selector) {
            for attr in IMAGE_ATTRS {
                if let Some(value) = element.value().attr(attr) {
                    push_candidate(&mut unique, &fragment.source_url, value);
                }
            }
            if let Some(srcset) = element.value().attr("srcset") {
                for candidate in parse_srcset(srcset) {
                    push_candidate(&mut unique, &fragment.source_url, candidate);
                }
            }
        }
    }

    unique.into_iter().collect()
}

fn push_candidate(set: &mut BTreeSet<Url>, base: &Url, raw: &str) {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return;
    }
    if let Ok(mut resolved) = base.join(raw) {
        if resolved.scheme() == "http" || resolved.scheme() == "https" {
            resolved.set_fragment(None);
            set.insert(resolved);
        }
    }
}

/// Pull the URL part out of each srcset entry ("url 2x, url 640w, ...").
fn parse_srcset(srcset: &str) -> impl Iterator<Item = &str> {
    srcset
        .split(',')
        .filter_map(|entry| entry.split_whitespace().next())
}
