//! DOM surgery for one fragment: selector-based removal, attribute policy,
//! image/link rewriting, and a final dangerous-markup strip.
//!
//! kuchiki does the mutation (scraper's DOM is read-only); ammonia runs last
//! so nothing our own passes miss survives into the import file.

use crate::images::RewriteMap;
use crate::sanitize::errors::SanitizeError;
use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink;
use url::Url;

/// Class tokens preserved by default so grid/layout markup survives the
/// migration. Everything else is stripped unless `keep_ids`-style overrides
/// say otherwise.
const LAYOUT_CLASS_PREFIXES: &[&str] = &[
    "align", "col-", "column", "gallery", "grid", "row", "wp-",
];

/// Attributes that may shadow the real image URL; dropped once `src` is
/// rewritten so the destination theme's lazy loader does not resurrect the
/// old URL.
const LAZY_IMAGE_ATTRS: &[&str] = &["data-src", "data-original", "data-lazy-src", "data-full"];

#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    /// Union of profile, run-level, and per-type removal selectors.
    pub remove_selectors: Vec<String>,
    /// Strip every class, ignoring the layout allowlist. Takes precedence.
    pub remove_all_classes: bool,
    /// Keep `id` attributes (stripped by default).
    pub keep_ids: bool,
}

/// Sanitize one fragment's HTML and rewrite its image/link URLs.
pub fn clean_fragment(
    content_html: &str,
    source_url: &Url,
    map: &RewriteMap,
    opts: &CleanOptions,
) -> Result<String, SanitizeError> {
    let document = kuchiki::parse_html().one(content_html);

    remove_matching(&document, &opts.remove_selectors);
    apply_attribute_policy(&document, opts);
    rewrite_images(&document, source_url, map);
    resolve_links(&document, source_url);

    let body_html = serialize_body(&document)?;
    let cleaned = final_strip(&body_html);

    if is_effectively_empty(&cleaned) {
        return Err(SanitizeError::EmptyOutput);
    }
    Ok(cleaned)
}

fn remove_matching(document: &NodeRef, selectors: &[String]) {
    for selector in selectors {
        // Selectors are validated at profile load; anything unparsable here
        // is a run-level custom selector and is skipped rather than fatal.
        let Ok(matches) = document.select(selector) else {
            continue;
        };
        let nodes: Vec<NodeRef> = matches.map(|m| m.as_node().clone()).collect();
        for node in nodes {
            node.detach();
        }
    }
}

fn apply_attribute_policy(document: &NodeRef, opts: &CleanOptions) {
    let Ok(elements) = document.select("*") else {
        return;
    };
    for element in elements {
        let mut attrs = element.attributes.borrow_mut();

        attrs.remove("style");

        if opts.remove_all_classes {
            attrs.remove("class");
        } else if let Some(class_value) = attrs.get("class").map(|v| v.to_string()) {
            let kept: Vec<&str> = class_value
                .split_whitespace()
                .filter(|token| is_layout_class(token))
                .collect();
            if kept.is_empty() {
                attrs.remove("class");
            } else {
                attrs.insert("class", kept.join(" "));
            }
        }

        if !opts.keep_ids {
            attrs.remove("id");
        }
    }
}

fn is_layout_class(token: &str) -> bool {
    let token = token.to_ascii_lowercase();
    LAYOUT_CLASS_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

/// Swap every image URL that the resolver downloaded. References with no map
/// entry (failed or bypassed downloads) are left byte-for-byte untouched.
fn rewrite_images(document: &NodeRef, source_url: &Url, map: &RewriteMap) {
    if map.is_empty() {
        return;
    }
    let Ok(images) = document.select("img") else {
        return;
    };
    for element in images {
        let mut attrs = element.attributes.borrow_mut();

        let mut rewritten = None;
        for attr in ["src"].iter().chain(LAZY_IMAGE_ATTRS) {
            if let Some(value) = attrs.get(*attr).map(|v| v.to_string())
                && let Some(new_url) = lookup(map, source_url, &value)
            {
                rewritten = Some(new_url);
                break;
            }
        }
        if let Some(new_url) = rewritten {
            attrs.insert("src", new_url);
            for attr in LAZY_IMAGE_ATTRS {
                attrs.remove(*attr);
            }
        }

        if let Some(srcset) = attrs.get("srcset").map(|v| v.to_string()) {
            let new_srcset = rewrite_srcset(&srcset, source_url, map);
            attrs.insert("srcset", new_srcset);
        }
    }
}

fn rewrite_srcset(srcset: &str, source_url: &Url, map: &RewriteMap) -> String {
    srcset
        .split(',')
        .map(|entry| {
            let entry = entry.trim();
            let mut parts = entry.splitn(2, char::is_whitespace);
            let url_part = parts.next().unwrap_or("");
            let descriptor = parts.next();
            let rewritten = lookup(map, source_url, url_part)
                .unwrap_or_else(|| url_part.to_string());
            match descriptor {
                Some(d) => format!("{rewritten} {d}"),
                None => rewritten,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn lookup(map: &RewriteMap, source_url: &Url, raw: &str) -> Option<String> {
    let mut absolute = source_url.join(raw.trim()).ok()?;
    absolute.set_fragment(None);
    map.get(absolute.as_str())
        .map(|image| image.new_public_url.clone())
}

/// Resolve relative hrefs against the source page so internal links survive
/// the move to the destination host.
fn resolve_links(document: &NodeRef, source_url: &Url) {
    let Ok(anchors) = document.select("a[href]") else {
        return;
    };
    for element in anchors {
        let mut attrs = element.attributes.borrow_mut();
        if let Some(href) = attrs.get("href").map(|v| v.to_string()) {
            let href = href.trim();
            if href.starts_with('#') || href.starts_with("mailto:") {
                continue;
            }
            if let Ok(absolute) = source_url.join(href) {
                attrs.insert("href", absolute.to_string());
            }
        }
    }
}

fn serialize_body(document: &NodeRef) -> Result<String, SanitizeError> {
    let body = document
        .select_first("body")
        .map_err(|_| SanitizeError::Parse("fragment has no body".into()))?;

    let mut out = String::new();
    for child in body.as_node().children() {
        let mut buf = Vec::new();
        child
            .serialize(&mut buf)
            .map_err(|e| SanitizeError::Parse(e.to_string()))?;
        out.push_str(&String::from_utf8_lossy(&buf));
    }
    Ok(out)
}

/// Final pass: scripts, event handlers, iframes, and anything else dangerous,
/// with an allowlist that preserves the survivors of our own attribute policy.
fn final_strip(html: &str) -> String {
    ammonia::Builder::default()
        .add_tags(["time", "figure", "figcaption"])
        .add_generic_attributes(["class", "id"])
        .add_tag_attributes("img", ["srcset", "loading"])
        .add_tag_attributes("time", ["datetime"])
        .clean(html)
        .to_string()
}

/// A fragment that sanitized down to whitespace (and contains no images) has
/// nothing to import.
fn is_effectively_empty(html: &str) -> bool {
    if html.contains("<img") {
        return false;
    }
    let document = kuchiki::parse_html().one(html);
    document.text_contents().trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{ImageFormat, ImageRef};

    fn url() -> Url {
        Url::parse("https://example.com/blog/post-1/").unwrap()
    }

    fn map_with(original: &str, public: &str) -> RewriteMap {
        let mut map = RewriteMap::default();
        map.insert(ImageRef {
            original_url: original.to_string(),
            local_path: "/data/images/x.jpg".into(),
            new_public_url: public.to_string(),
            format: ImageFormat::Jpeg,
            bytes: 1,
        });
        map
    }

    #[test]
    fn removes_elements_matching_selectors() {
        let opts = CleanOptions {
            remove_selectors: vec![".ad".into()],
            ..Default::default()
        };
        let html = r#"<div class="ad">X</div><p>Y</p>"#;
        let out = clean_fragment(html, &url(), &RewriteMap::default(), &opts).unwrap();
        assert!(out.contains('Y'));
        assert!(!out.contains('X'));
    }

    #[test]
    fn strips_style_and_nonlayout_classes_and_ids() {
        let html = r#"<p id="intro" style="color:red" class="fancy wp-block-quote">text</p>"#;
        let out =
            clean_fragment(html, &url(), &RewriteMap::default(), &CleanOptions::default())
                .unwrap();
        assert!(!out.contains("style="));
        assert!(!out.contains("fancy"));
        assert!(out.contains("wp-block-quote"));
        assert!(!out.contains("id="));
    }

    #[test]
    fn remove_all_classes_overrides_allowlist() {
        let opts = CleanOptions {
            remove_all_classes: true,
            ..Default::default()
        };
        let html = r#"<p class="wp-block-quote">text</p>"#;
        let out = clean_fragment(html, &url(), &RewriteMap::default(), &opts).unwrap();
        assert!(!out.contains("class="));
    }

    #[test]
    fn keep_ids_flag_preserves_ids() {
        let opts = CleanOptions {
            keep_ids: true,
            ..Default::default()
        };
        let html = r#"<h2 id="section-2">heading</h2>"#;
        let out = clean_fragment(html, &url(), &RewriteMap::default(), &opts).unwrap();
        assert!(out.contains(r#"id="section-2""#));
    }

    #[test]
    fn rewrites_mapped_image_src() {
        let map = map_with(
            "https://example.com/img/pic.jpg",
            "/wp-content/uploads/abc.jpg",
        );
        let html = r#"<p><img src="/img/pic.jpg" alt="pic"></p>"#;
        let out = clean_fragment(html, &url(), &map, &CleanOptions::default()).unwrap();
        assert!(out.contains(r#"src="/wp-content/uploads/abc.jpg""#));
    }

    #[test]
    fn unmapped_image_left_untouched() {
        let map = map_with("https://example.com/other.jpg", "/uploads/other.jpg");
        let html = r#"<img src="/img/missing.jpg" alt="x">"#;
        let out = clean_fragment(html, &url(), &map, &CleanOptions::default()).unwrap();
        assert!(out.contains(r#"src="/img/missing.jpg""#));
    }

    #[test]
    fn empty_map_leaves_image_urls_unmodified() {
        let html = r#"<img src="/img/a.jpg" alt="x">"#;
        let out =
            clean_fragment(html, &url(), &RewriteMap::default(), &CleanOptions::default())
                .unwrap();
        assert!(out.contains(r#"src="/img/a.jpg""#));
    }

    #[test]
    fn rewrites_srcset_entries_individually() {
        let map = map_with(
            "https://example.com/img/small.jpg",
            "/uploads/small-local.jpg",
        );
        let html = r#"<img src="/img/small.jpg" srcset="/img/small.jpg 640w, /img/big.jpg 1280w">"#;
        let out = clean_fragment(html, &url(), &map, &CleanOptions::default()).unwrap();
        assert!(out.contains("/uploads/small-local.jpg 640w"));
        assert!(out.contains("/img/big.jpg 1280w"));
    }

    #[test]
    fn lazy_load_attribute_promotes_to_src() {
        let map = map_with(
            "https://example.com/img/lazy.jpg",
            "/uploads/lazy-local.jpg",
        );
        let html = r#"<img data-src="/img/lazy.jpg" src="placeholder.gif">"#;
        let out = clean_fragment(html, &url(), &map, &CleanOptions::default()).unwrap();
        // data-src wins only when src itself has no map entry.
        assert!(out.contains(r#"src="/uploads/lazy-local.jpg""#));
        assert!(!out.contains("data-src"));
    }

    #[test]
    fn relative_links_become_absolute() {
        let html = r#"<a href="/about">about</a><a href="other-post/">next</a>"#;
        let out =
            clean_fragment(html, &url(), &RewriteMap::default(), &CleanOptions::default())
                .unwrap();
        assert!(out.contains(r#"href="https://example.com/about""#));
        assert!(out.contains(r#"href="https://example.com/blog/post-1/other-post/""#));
    }

    #[test]
    fn scripts_are_stripped() {
        let html = r#"<p>safe</p><script>alert(1)</script>"#;
        let out =
            clean_fragment(html, &url(), &RewriteMap::default(), &CleanOptions::default())
                .unwrap();
        assert!(out.contains("safe"));
        assert!(!out.contains("script"));
    }

    #[test]
    fn whitespace_only_result_is_empty_output() {
        let opts = CleanOptions {
            remove_selectors: vec!["p".into()],
            ..Default::default()
        };
        let err = clean_fragment("<p>only text</p>", &url(), &RewriteMap::default(), &opts)
            .unwrap_err();
        assert!(matches!(err, SanitizeError::EmptyOutput));
    }

    #[test]
    fn image_only_fragment_is_not_empty() {
        let html = r#"<img src="https://example.com/a.jpg" alt="">"#;
        assert!(
            clean_fragment(html, &url(), &RewriteMap::default(), &CleanOptions::default())
                .is_ok()
        );
    }
}
