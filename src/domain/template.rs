//! Command template placeholder handling.

/// Token replaced by the current item's text.
pub const PLACEHOLDER: &str = "{}";

/// Append the placeholder as a trailing argument when the template lacks one.
pub fn ensure_placeholder(command: &str) -> String {
    if command.contains(PLACEHOLDER) {
        command.to_string()
    } else if command.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        format!("{} {}", command, PLACEHOLDER)
    }
}

/// Build the concrete command for one item.
///
/// Literal, single-pass, global replacement: every placeholder in the
/// template is replaced, placeholders inside `item` are left alone.
pub fn render_command(template: &str, item: &str) -> String {
    template.replace(PLACEHOLDER, item)
}
