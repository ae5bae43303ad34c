//! Title/date extraction: configured selectors first, built-in heuristics
//! second. Extraction failures are non-fatal; the field stays empty.

use scraper::{Html, Selector};

pub fn extract_title(content_html: &str, title_selector: Option<&str>) -> Option<String> {
    let document = Html::parse_fragment(content_html);

    if let Some(selector) = title_selector
        && let Some(text) = first_text(&document, selector)
    {
        return Some(text);
    }

    // Heuristics: first h1, then first h2.
    first_text(&document, "h1").or_else(|| first_text(&document, "h2"))
}

pub fn extract_date(content_html: &str, date_selector: Option<&str>) -> Option<String> {
    let document = Html::parse_fragment(content_html);

    if let Some(selector) = date_selector {
        if let Some(attr) = first_attr(&document, selector, "datetime") {
            return Some(attr);
        }
        if let Some(text) = first_text(&document, selector) {
            return Some(text);
        }
    }

    // Heuristics: machine-readable datetime, then visible <time> text.
    first_attr(&document, "time[datetime]", "datetime")
        .or_else(|| first_text(&document, "time"))
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    for element in document.select(&selector) {
        let text = element.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .find_map(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_title_selector_wins() {
        let html = r#"<h1>Generic H1</h1><span class="headline">Real Title</span>"#;
        assert_eq!(
            extract_title(html, Some(".headline")).as_deref(),
            Some("Real Title")
        );
    }

    #[test]
    fn title_falls_back_to_h1() {
        let html = r#"<h1>The Heading</h1><p>body</p>"#;
        assert_eq!(extract_title(html, None).as_deref(), Some("The Heading"));
        assert_eq!(
            extract_title(html, Some(".missing")).as_deref(),
            Some("The Heading")
        );
    }

    #[test]
    fn missing_title_is_none() {
        assert_eq!(extract_title("<p>no headings</p>", None), None);
    }

    #[test]
    fn date_prefers_datetime_attribute() {
        let html = r#"<time datetime="2023-11-05T10:00:00Z">November 5</time>"#;
        assert_eq!(
            extract_date(html, None).as_deref(),
            Some("2023-11-05T10:00:00Z")
        );
    }

    #[test]
    fn date_selector_text_when_no_attribute() {
        let html = r#"<span class="posted">2023-11-05</span>"#;
        assert_eq!(extract_date(html, Some(".posted")).as_deref(), Some("2023-11-05"));
    }

    #[test]
    fn missing_date_is_none() {
        assert_eq!(extract_date("<p>undated</p>", None), None);
    }
}
