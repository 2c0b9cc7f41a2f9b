/// Wraps pasted text in its source header. The text is used verbatim.
pub fn wrap_pasted_text(text: &str) -> String {
    format!("--- Pasted Text ---\n{}", text)
}
