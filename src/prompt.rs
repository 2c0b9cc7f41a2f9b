//! Prompt composition.

use crate::html::truncate_chars;
use crate::models::SavedAnalysis;

pub const DOC_SEPARATOR: &str = "\n\n--- DOC SEPARATOR ---\n\n";
const INCLUDED_START: &str = "=== START OF INCLUDED SAVED ANALYSES ===";
const INCLUDED_END: &str = "=== END OF INCLUDED SAVED ANALYSES ===";

/// Prepends the included saved analyses and then the custom instructions to
/// the user's prompt.
pub fn compose_prompt(
    custom_instructions: Option<&str>,
    included: &[SavedAnalysis],
    user_prompt: &str,
) -> String {
    let mut prompt = String::new();

    if let Some(instructions) = custom_instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str(instructions);
        prompt.push_str("\n\n");
    }

    if !included.is_empty() {
        prompt.push_str(INCLUDED_START);
        prompt.push('\n');
        for analysis in included {
            prompt.push_str(&format!("--- {} ---\n{}\n\n", analysis.title, analysis.ai_output));
        }
        prompt.push_str(INCLUDED_END);
        prompt.push_str("\n\n");
    }

    prompt.push_str(user_prompt);
    prompt
}

/// Joins the non-empty source texts with the document separator.
pub fn combine_sources<S: AsRef<str>>(pieces: &[S]) -> String {
    pieces
        .iter()
        .map(|p| AsRef::<str>::as_ref(p))
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(DOC_SEPARATOR)
}

/// Cuts combined content to `max_chars`, appending a marker when it did.
pub fn apply_budget(content: String, max_chars: Option<usize>) -> String {
    match max_chars {
        Some(max) if content.chars().count() > max => {
            let mut cut = truncate_chars(&content, max).to_string();
            cut.push_str(&format!("\n\n[Content truncated to {} characters]", max));
            cut
        }
        _ => content,
    }
}
