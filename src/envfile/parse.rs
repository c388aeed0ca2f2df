//! Line-level parsing and the overlay rewrite of `.env` text.

use std::collections::BTreeMap;

/// Comment written above keys appended by an overlay.
pub const OVERLAY_MARKER: &str = "# Added by forge deploy wizard";

/// Splits a line into `(key, value)` if it is an assignment.
///
/// Blank lines, comments and lines without `=` are not assignments.
/// A leading `export ` on the key is tolerated.
#[must_use]
pub fn parse_assignment(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let (raw_key, value) = trimmed.split_once('=')?;
    let key = raw_key.trim();
    let key = key.strip_prefix("export ").map_or(key, str::trim);
    if key.is_empty() {
        return None;
    }

    Some((key, value.trim()))
}

/// Result of applying an overlay to a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayText {
    /// The rewritten content.
    pub content: String,
    /// Keys whose existing line was rewritten in place.
    pub rewritten: Vec<String>,
    /// Keys appended under the marker comment.
    pub appended: Vec<String>,
}

/// Applies `updates` to `content`.
///
/// Only the first assignment line of each updated key is rewritten, keeping
/// the key text exactly as written. Keys with no matching line are appended
/// in sorted order under [`OVERLAY_MARKER`]. Every other line is kept as is,
/// and CRLF files stay CRLF.
#[must_use]
pub fn overlay_text(content: &str, updates: &BTreeMap<String, String>) -> OverlayText {
    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let mut pending = updates.clone();
    let mut rewritten = Vec::new();
    let mut lines: Vec<String> = Vec::new();

    for line in content.lines() {
        let replacement = parse_assignment(line).and_then(|(key, _)| {
            pending.remove(key).map(|value| {
                rewritten.push(key.to_string());
                value
            })
        });

        match (replacement, line.find('=')) {
            (Some(value), Some(eq)) => lines.push(format!("{}={value}", &line[..eq])),
            _ => lines.push(line.to_string()),
        }
    }

    let appended: Vec<String> = pending.keys().cloned().collect();
    if !pending.is_empty() {
        if lines.last().is_some_and(|last| !last.trim().is_empty()) {
            lines.push(String::new());
        }
        lines.push(OVERLAY_MARKER.to_string());
        lines.extend(pending.iter().map(|(key, value)| format!("{key}={value}")));
    }

    let content = if lines.is_empty() {
        String::new()
    } else {
        let mut joined = lines.join(newline);
        joined.push_str(newline);
        joined
    };

    OverlayText {
        content,
        rewritten,
        appended,
    }
}
