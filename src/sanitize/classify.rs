//! Post-vs-page classification.
//!
//! Priority: run-level declared type, then profile discriminator selectors,
//! then structural heuristics. Ambiguity resolves to page: a page imported
//! as a post pollutes the blog feed, the reverse is just a misfiled document.

use crate::pipeline::RunContentType;
use crate::profile::ClassifierRules;
use crate::sanitize::types::ContentType;
use scraper::{Html, Selector};

/// Built-in structural signals that mark a fragment as a post. Overridable
/// per profile via discriminator `type_selectors`.
const DATE_SIGNALS: &str = "time, .date, .published, .post-date, .entry-date, .posted-on";
const BYLINE_SIGNALS: &str = ".byline, .author, [rel='author'], .meta-author";
const CHRONOLOGICAL_SIGNALS: &str = "article[class*='post'], .hentry, [class*='blog-post']";

pub fn classify(
    content_html: &str,
    declared: RunContentType,
    post_rules: &ClassifierRules,
    page_rules: &ClassifierRules,
) -> ContentType {
    match declared {
        RunContentType::Post => return ContentType::Post,
        RunContentType::Page => return ContentType::Page,
        RunContentType::Auto => {}
    }

    let document = Html::parse_fragment(content_html);

    // 1. Explicit discriminator selectors.
    let type_selectors = post_rules
        .type_selectors
        .as_ref()
        .or(page_rules.type_selectors.as_ref());
    if let Some(ts) = type_selectors {
        let post_hit = matches(&document, &ts.post);
        let page_hit = matches(&document, &ts.page);
        match (post_hit, page_hit) {
            (true, false) => return ContentType::Post,
            (false, true) => return ContentType::Page,
            // Both markers present is ambiguous; ambiguity is a page even
            // when structural signals would say post.
            (true, true) => return ContentType::Page,
            (false, false) => {}
        }
    }

    // 2. Structural heuristics.
    if matches(&document, DATE_SIGNALS)
        || matches(&document, BYLINE_SIGNALS)
        || matches(&document, CHRONOLOGICAL_SIGNALS)
    {
        return ContentType::Post;
    }

    // 3. Default.
    ContentType::Page
}

fn matches(document: &Html, selector: &str) -> bool {
    Selector::parse(selector)
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::TypeSelectors;

    fn rules_with_discriminators() -> ClassifierRules {
        ClassifierRules {
            type_selectors: Some(TypeSelectors {
                post: ".post-marker".into(),
                page: ".page-marker".into(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn declared_type_short_circuits() {
        let rules = ClassifierRules::default();
        let html = r#"<time datetime="2024-01-01">Jan 1</time><p>clearly a post</p>"#;
        assert_eq!(
            classify(html, RunContentType::Page, &rules, &rules),
            ContentType::Page
        );
    }

    #[test]
    fn discriminator_selector_wins_over_heuristics() {
        let rules = rules_with_discriminators();
        // Has a date signal, but the page marker is explicit.
        let html = r#"<div class="page-marker"></div><time>Jan 1</time><p>x</p>"#;
        assert_eq!(
            classify(html, RunContentType::Auto, &rules, &rules),
            ContentType::Page
        );
    }

    #[test]
    fn discriminator_tie_resolves_to_page() {
        let rules = rules_with_discriminators();
        let html = r#"<div class="post-marker"></div><div class="page-marker"></div><p>x</p>"#;
        assert_eq!(
            classify(html, RunContentType::Auto, &rules, &rules),
            ContentType::Page
        );
    }

    #[test]
    fn discriminator_tie_beats_structural_signals() {
        let rules = rules_with_discriminators();
        // The date signal alone would say post; the tie must still win.
        let html = r#"<div class="post-marker"></div><div class="page-marker"></div><time datetime="2024-01-01">Jan 1</time><p>x</p>"#;
        assert_eq!(
            classify(html, RunContentType::Auto, &rules, &rules),
            ContentType::Page
        );
    }

    #[test]
    fn date_element_implies_post() {
        let rules = ClassifierRules::default();
        let html = r#"<time datetime="2024-05-02">May 2</time><p>body</p>"#;
        assert_eq!(
            classify(html, RunContentType::Auto, &rules, &rules),
            ContentType::Post
        );
    }

    #[test]
    fn byline_implies_post() {
        let rules = ClassifierRules::default();
        let html = r#"<span class="byline">By Sam</span><p>body</p>"#;
        assert_eq!(
            classify(html, RunContentType::Auto, &rules, &rules),
            ContentType::Post
        );
    }

    #[test]
    fn plain_content_defaults_to_page() {
        let rules = ClassifierRules::default();
        let html = r#"<h1>About us</h1><p>We are a company.</p>"#;
        assert_eq!(
            classify(html, RunContentType::Auto, &rules, &rules),
            ContentType::Page
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let rules = ClassifierRules::default();
        let html = r#"<time>Jan</time><p>body</p>"#;
        let first = classify(html, RunContentType::Auto, &rules, &rules);
        for _ in 0..10 {
            assert_eq!(classify(html, RunContentType::Auto, &rules, &rules), first);
        }
    }
}
