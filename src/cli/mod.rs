//! CLI module for loopy - command-line interface and subcommands.
//!
//! Argument parsing lives in [`commands`]; the interactive item editor in
//! [`editor`]. Handlers are in `main.rs`.

pub mod commands;
pub mod editor;

pub use commands::Cli;

use std::io::{self, BufRead};

use loopy::domain::PLACEHOLDER;

/// Join command words into a template, adding a `{}` word unless one of the
/// words is exactly `{}`.
///
/// `echo x{}y` becomes `echo x{}y {}`: an embedded `{}` is still substituted,
/// but the item is also passed as a final argument.
pub fn command_template(words: &[String]) -> String {
    if words.iter().any(|word| word == PLACEHOLDER) {
        words.join(" ")
    } else {
        format!("{} {}", words.join(" "), PLACEHOLDER)
    }
}

/// Split text into items: one per line, trimmed, blank lines dropped.
pub fn parse_items(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Read items from a line-oriented reader, e.g. standard input.
pub fn read_items<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            items.push(line.to_string());
        }
    }
    Ok(items)
}
