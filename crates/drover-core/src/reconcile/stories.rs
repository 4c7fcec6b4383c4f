//! Extraction of `user_stories` from an agent's `resultText`.
//!
//! The epic prompt asks the agent to end its report with a fenced ```json
//! array of user stories. Compliance varies, so extraction is layered: the
//! tagged fenced block first, then any bare array-of-objects shape, and
//! (for the epic endpoint's dedicated second pass) any single object.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use super::{OBJECT_RE, Reconciled};

/// Fenced ```json block wrapping an array of objects.
static FENCED_ARRAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json\s*(\[\s*\{.*?\}\s*\])\s*```").expect("fenced array regex is valid")
});

/// Bare array-of-objects shape, fence or no fence.
static ARRAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\s*\{.*?\}\s*\]").expect("array regex is valid"));

/// Any fenced ```json block, whatever it contains.
static FENCED_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json.*?```").expect("fenced block regex is valid"));

/// Pull an inline user-story array out of `resultText`, if there is one.
///
/// When a fenced ```json block holds a parseable array, the array moves to
/// a `user_stories` key and that block alone is cut from `resultText`. A
/// fenced block that fails to parse leaves the object untouched. Without
/// any fenced block, a bare array-of-objects match is attached but the
/// text keeps it; there is no way to know how much surrounding prose
/// belongs to it.
pub(super) fn extract_inline_stories(mut map: Map<String, Value>) -> Map<String, Value> {
    let Some(text) = map.get("resultText").and_then(Value::as_str) else {
        return map;
    };
    let text = text.to_string();

    if let Some(caps) = FENCED_ARRAY_RE.captures(&text) {
        if let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) {
            if let Ok(stories) = serde_json::from_str::<Value>(inner.as_str()) {
                debug!("extracted fenced user story array from resultText");
                let mut stripped = String::with_capacity(text.len());
                stripped.push_str(&text[..whole.start()]);
                stripped.push_str(&text[whole.end()..]);
                map.insert("user_stories".to_string(), stories);
                map.insert(
                    "resultText".to_string(),
                    Value::String(stripped.trim().to_string()),
                );
            }
        }
        return map;
    }

    if let Some(m) = ARRAY_RE.find(&text) {
        if let Ok(stories) = serde_json::from_str::<Value>(m.as_str()) {
            debug!("extracted bare user story array from resultText");
            map.insert("user_stories".to_string(), stories);
        }
    }
    map
}

/// Second extraction pass used by the epic endpoint.
///
/// Raw reconciliations pass through, as do objects that already carry
/// `user_stories`. Otherwise, when `resultText` is a string, the first
/// `{...}` substring inside it is parsed into `user_stories` (an empty
/// array when nothing parses), and the first fenced ```json block is cut
/// from `resultText` whether or not that parse succeeded. Unlike the
/// inline extraction, the whitespace around the removed block is kept.
pub fn attach_user_stories(reconciled: Reconciled) -> Reconciled {
    let Reconciled::Structured(mut map) = reconciled else {
        return reconciled;
    };
    if map.contains_key("user_stories") {
        return Reconciled::Structured(map);
    }
    let Some(text) = map.get("resultText").and_then(Value::as_str) else {
        return Reconciled::Structured(map);
    };
    let text = text.to_string();

    let stories = OBJECT_RE
        .find(&text)
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .unwrap_or_else(|| Value::Array(Vec::new()));

    let stripped = match FENCED_BLOCK_RE.find(&text) {
        Some(block) => {
            let mut s = String::with_capacity(text.len());
            s.push_str(&text[..block.start()]);
            s.push_str(&text[block.end()..]);
            s
        }
        None => text,
    };

    debug!("attached user stories from second-pass extraction");
    map.insert("resultText".to_string(), Value::String(stripped));
    map.insert("user_stories".to_string(), stories);
    Reconciled::Structured(map)
}
