use scraper::{ElementRef, Html, Selector};
use once_cell::sync::Lazy;

// Create static selectors to avoid recompiling them each time
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("body").expect("Failed to parse body selector")
});

static SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Returns the visible text of the document `<body>`, one block per line.
pub fn extract_body_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    document.select(&BODY_SELECTOR)
        .next()
        .map(|body| format_text(&visible_text(body)))
}

/// Removes markup from an HTML fragment and collapses whitespace to single spaces.
pub fn strip_html(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return collapse_whitespace(fragment);
    }
    let document = Html::parse_fragment(fragment);
    collapse_whitespace(&visible_text(document.root_element()))
}

fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        if let Some(text) = node.value().as_text() {
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| SKIPPED_TAGS.contains(&el.name()))
            });
            if !hidden {
                out.push_str(text);
            }
        } else if let Some(el) = node.value().as_element() {
            if matches!(el.name(), "br" | "p" | "div" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
                out.push('\n');
            }
        }
    }
    out
}

/// Trims every line and drops the empty ones.
pub fn format_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `text` to at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_text_skips_scripts_and_blank_lines() {
        let html = "<html><head><title>t</title></head><body>\n<h1>Hello</h1>\n<script>var x = 1;</script><p>  World  </p></body></html>";
        let text = extract_body_text(html).unwrap();
        assert_eq!(text, "Hello\nWorld");
    }

    #[test]
    fn format_text_trims_lines_and_drops_blank_ones() {
        assert_eq!(format_text("  a  \n\n\t\n b\n"), "a\nb");
        assert_eq!(format_text(" \n "), "");
    }

    #[test]
    fn strip_html_decodes_entities_and_collapses() {
        assert_eq!(strip_html("<p>Fish &amp; <b>chips</b></p>\n\n<p>today</p>"), "Fish & chips today");
        assert_eq!(strip_html("plain   text"), "plain text");
    }

    #[test]
    fn truncate_respects_multibyte_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
