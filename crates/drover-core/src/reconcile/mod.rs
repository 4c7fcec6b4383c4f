//! Layered, best-effort reconciliation of agent stdout into JSON.
//!
//! The agent's output format is not a contract. A run may print clean JSON,
//! JSON buried in log noise, a Python-flavored dict, or plain prose, and
//! the format can drift between agent versions. Every recovery step below
//! is therefore a fallible attempt: the first success wins, and total
//! failure degrades to handing back the raw text. Reconciliation never
//! fails a request on its own.

mod lenient;
mod stories;

pub use stories::attach_user_stories;

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::debug;

/// First brace-delimited substring, shortest match.
static OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*?\}").expect("object regex is valid"));

/// Outcome of reconciling agent stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// A structured object was recovered, possibly augmented with
    /// `user_stories` pulled out of its `resultText`.
    Structured(Map<String, Value>),
    /// Nothing parseable: the original stdout, byte for byte.
    Raw(String),
}

impl Reconciled {
    /// The JSON response body for this outcome. Raw text is wrapped under a
    /// `response` key so the API always answers with an object.
    pub fn into_body(self) -> Value {
        match self {
            Reconciled::Structured(map) => Value::Object(map),
            Reconciled::Raw(text) => json!({ "response": text }),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Reconciled::Structured(_))
    }
}

/// Reconcile raw agent stdout into the most structured form obtainable.
///
/// Recovery steps, in order, first success wins:
///
/// 1. slice the text from its first `{`, discarding any log preamble;
/// 2. strict-parse the slice, then mine `resultText` for an inline
///    user-story array;
/// 3. strict-parse the first `{...}` substring of the original text;
/// 4. permissively parse the slice, tolerating Python literal syntax;
/// 5. give up and return the original text untouched.
pub fn reconcile(stdout: &str) -> Reconciled {
    if let Some(start) = stdout.find('{') {
        let candidate = &stdout[start..];

        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
            debug!("agent output parsed as strict JSON");
            return Reconciled::Structured(stories::extract_inline_stories(map));
        }

        if let Some(map) = first_embedded_object(stdout) {
            debug!("recovered first embedded JSON object from agent output");
            return Reconciled::Structured(map);
        }

        let literal = candidate.trim();
        if literal.starts_with('{') && literal.ends_with('}') {
            if let Some(Value::Object(map)) = lenient::parse_lenient(literal) {
                debug!("agent output parsed as a Python-style literal");
                return Reconciled::Structured(map);
            }
        }
    }

    debug!(len = stdout.len(), "agent output did not reconcile; returning raw text");
    Reconciled::Raw(stdout.to_string())
}

/// Strict-parse the first `{...}` substring of `text`.
///
/// The shortest match recovers flat objects adrift in prose; an object with
/// nested braces truncates at its first `}` and fails the parse, which is
/// what lets the later steps have their turn.
fn first_embedded_object(text: &str) -> Option<Map<String, Value>> {
    let m = OBJECT_RE.find(text)?;
    match serde_json::from_str::<Value>(m.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
