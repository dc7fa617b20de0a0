//! Interactive editing of loop items in the user's text editor.

use eyre::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::io::Write;
use std::process::Command;

/// Editor used when nothing else is configured
pub const FALLBACK_EDITOR: &str = "vi";

/// Pick the editor: `$VISUAL`, then `$EDITOR`, then the configured one, then `vi`.
pub fn resolve_editor(configured: Option<&str>) -> String {
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .chain(configured.map(String::from))
        .find(|editor| !editor.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_EDITOR.to_string())
}

/// Open `text` in `editor` and return the edited text.
///
/// Returns `None` when the editor exits unsuccessfully or the text comes back
/// unchanged.
pub fn edit_text(editor: &str, text: &str) -> Result<Option<String>> {
    let mut file = tempfile::Builder::new()
        .prefix("loopy-items-")
        .suffix(".txt")
        .tempfile()
        .context("Failed to create temporary file")?;
    file.write_all(text.as_bytes())
        .context("Failed to write temporary file")?;
    file.flush().context("Failed to write temporary file")?;

    debug!("Opening {} in {}", file.path().display(), editor);
    // Through the shell so editors configured with arguments ("code -w") work.
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("{} \"$1\"", editor))
        .arg("loopy-edit")
        .arg(file.path())
        .status()
        .context(format!("Failed to launch editor {}", editor))?;

    if !status.success() {
        warn!("Editor {} exited with {}", editor, status);
        return Ok(None);
    }

    let edited = fs::read_to_string(file.path()).context("Failed to read edited file")?;
    if edited == text {
        return Ok(None);
    }
    Ok(Some(edited))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_text_is_cancelled() {
        let edited = edit_text("true", "a\nb").unwrap();
        assert!(edited.is_none());
    }

    #[test]
    fn test_failing_editor_is_cancelled() {
        let edited = edit_text("false", "a\nb").unwrap();
        assert!(edited.is_none());
    }

    #[test]
    fn test_edited_text_is_returned() {
        let edited = edit_text("printf 'x\\ny\\n' >", "a\nb").unwrap();
        assert_eq!(edited.as_deref(), Some("x\ny\n"));
    }

    #[test]
    fn test_configured_editor_used_without_env() {
        // Only meaningful when neither variable is set in the test environment
        if std::env::var("VISUAL").is_err() && std::env::var("EDITOR").is_err() {
            assert_eq!(resolve_editor(Some("nano")), "nano");
            assert_eq!(resolve_editor(None), FALLBACK_EDITOR);
        }
    }
}
