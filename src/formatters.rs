//! Turns Apify actor dataset items into markdown-flavoured text blocks.
//!
//! These functions are pure: they never log and never fail. Missing fields
//! fall back along fixed chains and empty input yields a fixed sentinel.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::html::{strip_html, truncate_chars};

pub const NO_ARTICLES: &str = "No article content was extracted.";
pub const NO_BING_RESULTS: &str = "No Bing search results were found.";
pub const NO_FEED_ITEMS: &str = "No RSS/XML feed items were found.";

const FEED_CONTENT_LIMIT: usize = 300;

pub fn format_article_extractor_smart_output(items: &[Value]) -> String {
    if items.is_empty() {
        return NO_ARTICLES.to_string();
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| format_article(i + 1, item))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_article(n: usize, item: &Value) -> String {
    let url = text_field(item, &["url", "loadedUrl"]);
    let title = text_field(item, &["title"])
        .or_else(|| url.as_ref().map(|u| format!("Article from {}", u)))
        .unwrap_or_else(|| "Untitled Article".to_string());

    let mut meta = Vec::new();
    if let Some(author) = list_field(item, &["author", "authors"]) {
        meta.push(format!("**Author:** {}", author));
    }
    if let Some(date) = text_field(item, &["date", "publishedAt", "datePublished"]) {
        meta.push(format!("**Published:** {}", format_date(&date)));
    }
    if let Some(publisher) = text_field(item, &["publisher", "siteName"]) {
        meta.push(format!("**Publisher:** {}", publisher));
    }
    if let Some(url) = &url {
        meta.push(format!("**URL:** {}", url));
    }
    if let Some(description) = text_field(item, &["description"]) {
        meta.push(format!("**Description:** {}", description));
    }
    if let Some(keywords) = list_field(item, &["keywords"]) {
        meta.push(format!("**Keywords:** {}", keywords));
    }

    let text = text_field(item, &["text", "content"]).unwrap_or_else(|| "No content extracted.".to_string());

    let mut blocks = vec![format!("# Article {}: {}", n, title)];
    if !meta.is_empty() {
        blocks.push(meta.join("\n"));
    }
    blocks.push("## Content".to_string());
    blocks.push(text);
    blocks.push(format!("--- End of Article {} ---", n));
    blocks.join("\n\n")
}

pub fn format_bing_search_scraper_output(items: &[Value]) -> String {
    if items.is_empty() {
        return NO_BING_RESULTS.to_string();
    }

    let mut blocks = vec!["# Bing Search Results".to_string()];
    for item in items {
        blocks.push(format_bing_batch(item));
    }
    blocks.join("\n\n")
}

fn format_bing_batch(item: &Value) -> String {
    let query = item.get("searchQuery");
    let term = query
        .and_then(|q| text_field(q, &["term"]))
        .unwrap_or_else(|| "Unknown query".to_string());
    let mut header = format!("## Search: \"{}\"", term);
    if let Some(page) = query.and_then(|q| q.get("page")).and_then(Value::as_u64) {
        header.push_str(&format!(" (Page {})", page));
    }

    let mut blocks = vec![header];

    // Flat result items carry the result fields at the top level.
    let flat = [item.clone()];
    let results: &[Value] = match item.get("organicResults").and_then(Value::as_array) {
        Some(results) => results.as_slice(),
        None if item.get("url").is_some() => &flat[..],
        None => &[],
    };

    if results.is_empty() {
        blocks.push("No organic results.".to_string());
    } else {
        let lines = results
            .iter()
            .enumerate()
            .map(|(i, result)| {
                let title = text_field(result, &["title"]).unwrap_or_else(|| "Untitled".to_string());
                let mut entry = format!("{}. **{}**", i + 1, title);
                if let Some(url) = text_field(result, &["url", "displayedUrl"]) {
                    entry.push_str(&format!("\n   URL: {}", url));
                }
                if let Some(description) = text_field(result, &["description", "snippet"]) {
                    entry.push_str(&format!("\n   {}", description));
                }
                entry
            })
            .collect::<Vec<_>>();
        blocks.push(lines.join("\n\n"));
    }

    let related = bullet_list(item.get("relatedQueries"), &["title", "query", "text"]);
    if !related.is_empty() {
        blocks.push(format!("### Related Queries\n\n{}", related));
    }

    let people = bullet_list(item.get("peopleAlsoAsk"), &["question", "title"]);
    if !people.is_empty() {
        blocks.push(format!("### People Also Ask\n\n{}", people));
    }

    blocks.join("\n\n")
}

fn bullet_list(value: Option<&Value>, keys: &[&str]) -> String {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match entry {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    other => text_field(other, keys),
                })
                .map(|line| format!("- {}", line))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

pub fn format_rss_xml_scraper_output(items: &[Value]) -> String {
    if items.is_empty() {
        return NO_FEED_ITEMS.to_string();
    }

    let mut blocks = vec!["# RSS/XML Feed Items".to_string()];
    for (i, item) in items.iter().enumerate() {
        blocks.push(format_feed_item(i + 1, item));
    }
    blocks.join("\n\n")
}

fn format_feed_item(n: usize, item: &Value) -> String {
    let title = text_field(item, &["title"]).unwrap_or_else(|| "Untitled Item".to_string());

    let mut meta = Vec::new();
    if let Some(date) = text_field(item, &["pubDate", "isoDate", "published", "updated", "date"]) {
        meta.push(format!("**Published:** {}", format_date(&date)));
    }
    if let Some(author) = list_field(item, &["author", "creator", "dc:creator"]) {
        meta.push(format!("**Author:** {}", author));
    }
    if let Some(link) = text_field(item, &["link", "url", "guid"]) {
        meta.push(format!("**Link:** {}", link));
    }
    if let Some(categories) = list_field(item, &["categories", "category"]) {
        meta.push(format!("**Categories:** {}", categories));
    }

    let mut blocks = vec![format!("## {}. {}", n, title)];
    if !meta.is_empty() {
        blocks.push(meta.join("\n"));
    }

    let content = text_field(item, &["content", "contentSnippet", "description", "summary"])
        .map(|raw| strip_html(&raw))
        .filter(|text| !text.is_empty());
    if let Some(content) = content {
        blocks.push(truncate_with_ellipsis(&content, FEED_CONTENT_LIMIT));
    }

    blocks.join("\n\n")
}

fn truncate_with_ellipsis(text: &str, limit: usize) -> String {
    let cut = truncate_chars(text, limit);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Reformats a date as `January 5, 2024`, or returns the input unchanged when
/// it does not parse.
pub fn format_date(raw: &str) -> String {
    let trimmed = raw.trim();
    const LONG: &str = "%B %-d, %Y";

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.format(LONG).to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return dt.format(LONG).to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return dt.format(LONG).to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.format(LONG).to_string();
    }
    raw.to_string()
}

/// First non-blank string (or number) among `keys`.
fn text_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Like [`text_field`] but also accepts arrays, joined with `, `.
fn list_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::Array(values) => {
            let parts = values
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    Value::Object(_) => text_field(v, &["name", "title"]),
                    _ => None,
                })
                .collect::<Vec<_>>();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(_) => text_field(item.get(*key)?, &["name", "title"]),
        _ => text_field(item, &[*key]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_inputs_return_sentinels() {
        assert_eq!(format_article_extractor_smart_output(&[]), "No article content was extracted.");
        assert_eq!(format_bing_search_scraper_output(&[]), "No Bing search results were found.");
        assert_eq!(format_rss_xml_scraper_output(&[]), "No RSS/XML feed items were found.");
    }

    #[test]
    fn single_article_matches_template() {
        let item = json!({
            "title": "Rust 2024 Released",
            "text": "The edition is out.",
            "author": "Jane Doe",
            "date": "2024-01-05T10:00:00Z",
            "publisher": "Example News",
            "url": "https://example.com/rust",
            "description": "Edition news",
            "keywords": ["rust", "edition"]
        });

        let expected = "# Article 1: Rust 2024 Released\n\n\
**Author:** Jane Doe\n\
**Published:** January 5, 2024\n\
**Publisher:** Example News\n\
**URL:** https://example.com/rust\n\
**Description:** Edition news\n\
**Keywords:** rust, edition\n\n\
## Content\n\n\
The edition is out.\n\n\
--- End of Article 1 ---";

        assert_eq!(format_article_extractor_smart_output(&[item]), expected);
    }

    #[test]
    fn article_title_falls_back_to_url() {
        let out = format_article_extractor_smart_output(&[json!({ "url": "https://a.test/x" })]);
        assert!(out.starts_with("# Article 1: Article from https://a.test/x\n\n**URL:** https://a.test/x"));
        assert!(out.contains("No content extracted."));

        let out = format_article_extractor_smart_output(&[json!({})]);
        assert!(out.starts_with("# Article 1: Untitled Article\n\n## Content"));
    }

    #[test]
    fn unparseable_dates_pass_through() {
        assert_eq!(format_date("last tuesday"), "last tuesday");
        assert_eq!(format_date("Tue, 05 Mar 2024 08:00:00 +0000"), "March 5, 2024");
        assert_eq!(format_date("2023-12-31"), "December 31, 2023");
    }

    #[test]
    fn bing_batch_lists_organic_and_related() {
        let item = json!({
            "searchQuery": { "term": "rust async", "page": 1 },
            "organicResults": [
                { "title": "Tokio", "url": "https://tokio.rs", "description": "Async runtime" },
                { "title": "async-std", "url": "https://async.rs" }
            ],
            "relatedQueries": [{ "title": "rust futures" }],
            "peopleAlsoAsk": [{ "question": "Is Rust async fast?" }]
        });

        let expected = "# Bing Search Results\n\n\
## Search: \"rust async\" (Page 1)\n\n\
1. **Tokio**\n   URL: https://tokio.rs\n   Async runtime\n\n\
2. **async-std**\n   URL: https://async.rs\n\n\
### Related Queries\n\n- rust futures\n\n\
### People Also Ask\n\n- Is Rust async fast?";

        assert_eq!(format_bing_search_scraper_output(&[item]), expected);
    }

    #[test]
    fn rss_item_strips_html_and_truncates() {
        let long = format!("<p>{}</p>", "a".repeat(400));
        let item = json!({
            "title": "Feed entry",
            "link": "https://feed.test/1",
            "pubDate": "2024-02-10",
            "content": long,
            "categories": ["news", "tech"]
        });

        let out = format_rss_xml_scraper_output(&[item]);
        let expected_body = format!("{}...", "a".repeat(300));
        assert_eq!(
            out,
            format!(
                "# RSS/XML Feed Items\n\n## 1. Feed entry\n\n**Published:** February 10, 2024\n**Link:** https://feed.test/1\n**Categories:** news, tech\n\n{}",
                expected_body
            )
        );
    }

    #[test]
    fn rss_short_content_is_not_ellipsized() {
        let out = format_rss_xml_scraper_output(&[json!({ "description": "<b>Hi</b> there" })]);
        assert_eq!(out, "# RSS/XML Feed Items\n\n## 1. Untitled Item\n\nHi there");
    }
}
