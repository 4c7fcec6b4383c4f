//! Permissive parsing for agent output that is almost JSON.
//!
//! Agents sometimes echo a Python-repr-flavored dict instead of strict
//! JSON: single-quoted strings, bare `True`/`False`/`None`, the odd
//! trailing comma. This module rewrites those shapes into strict JSON text
//! and parses the result. Anything it cannot confidently translate fails
//! the parse, and the caller falls through to the next recovery step.

use std::iter::Peekable;
use std::str::Chars;

use serde_json::Value;

/// Parse `text` as a JSON value, tolerating Python-literal syntax.
///
/// Returns `None` when the text is not valid under either syntax.
pub fn parse_lenient(text: &str) -> Option<Value> {
    let rewritten = rewrite_to_json(text)?;
    serde_json::from_str(&rewritten).ok()
}

/// Rewrite Python-literal syntax into strict JSON text.
///
/// Handles single-quoted strings (including `\'` escapes), the `True` /
/// `False` / `None` keywords outside strings, and trailing commas before a
/// closing brace or bracket. Unknown bare words are passed through for
/// `serde_json` to reject. Returns `None` on an unterminated string.
fn rewrite_to_json(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => rewrite_single_quoted(&mut chars, &mut out)?,
            '"' => copy_double_quoted(&mut chars, &mut out)?,
            ',' => {
                // Buffer trailing whitespace so the comma can be dropped if
                // the next token closes a container.
                let mut ws = String::new();
                while let Some(&next) = chars.peek() {
                    if !next.is_whitespace() {
                        break;
                    }
                    ws.push(next);
                    chars.next();
                }
                if !matches!(chars.peek(), Some('}') | Some(']')) {
                    out.push(',');
                }
                out.push_str(&ws);
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::new();
                word.push(c);
                while let Some(&next) = chars.peek() {
                    if !next.is_ascii_alphanumeric() && next != '_' {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                match word.as_str() {
                    "True" => out.push_str("true"),
                    "False" => out.push_str("false"),
                    "None" => out.push_str("null"),
                    _ => out.push_str(&word),
                }
            }
            _ => out.push(c),
        }
    }

    Some(out)
}

/// Re-emit a single-quoted string as a double-quoted JSON string.
fn rewrite_single_quoted(chars: &mut Peekable<Chars>, out: &mut String) -> Option<()> {
    out.push('"');
    loop {
        match chars.next()? {
            '\'' => {
                out.push('"');
                return Some(());
            }
            '"' => out.push_str("\\\""),
            '\\' => match chars.next()? {
                // `\'` means a literal quote, which needs no escape in JSON.
                '\'' => out.push('\''),
                esc => {
                    out.push('\\');
                    out.push(esc);
                }
            },
            c => out.push(c),
        }
    }
}

/// Copy a double-quoted string through untouched, tracking escapes so an
/// embedded `'` or `,` is not misread as syntax.
fn copy_double_quoted(chars: &mut Peekable<Chars>, out: &mut String) -> Option<()> {
    out.push('"');
    loop {
        let c = chars.next()?;
        out.push(c);
        match c {
            '"' => return Some(()),
            '\\' => out.push(chars.next()?),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn parses_strict_json_unchanged() {
        let value = parse_lenient(r#"{"status": "ok", "count": 3}"#).expect("parses");
        assert_eq!(value, json!({"status": "ok", "count": 3}));
    }

    #[test]
    fn parses_single_quoted_dict() {
        let value = parse_lenient("{'status': 'ok', 'message': 'done'}").expect("parses");
        assert_eq!(value, json!({"status": "ok", "message": "done"}));
    }

    #[test]
    fn translates_python_keywords() {
        let value = parse_lenient("{'ok': True, 'failed': False, 'detail': None}").expect("parses");
        assert_eq!(value, json!({"ok": true, "failed": false, "detail": null}));
    }

    #[test]
    fn keywords_inside_strings_are_untouched() {
        let value = parse_lenient("{'note': 'True means None here'}").expect("parses");
        assert_eq!(value, json!({"note": "True means None here"}));
    }

    #[test]
    fn drops_trailing_commas() {
        let value = parse_lenient("{'items': [1, 2, 3,], 'done': True,}").expect("parses");
        assert_eq!(value, json!({"items": [1, 2, 3], "done": true}));
    }

    #[test]
    fn handles_escaped_quote_in_single_quoted_string() {
        let value = parse_lenient(r"{'msg': 'it\'s finished'}").expect("parses");
        assert_eq!(value, json!({"msg": "it's finished"}));
    }

    #[test]
    fn escapes_double_quotes_inside_single_quoted_string() {
        let value = parse_lenient(r#"{'say': 'he said "hi"'}"#).expect("parses");
        assert_eq!(value, json!({"say": "he said \"hi\""}));
    }

    #[test]
    fn preserves_backslash_escapes() {
        let value = parse_lenient(r"{'path': 'a\nb'}").expect("parses");
        assert_eq!(value, json!({"path": "a\nb"}));
    }

    #[test]
    fn mixed_quote_styles_parse() {
        let value = parse_lenient(r#"{"outer": 'inner', 'flag': True}"#).expect("parses");
        assert_eq!(value, json!({"outer": "inner", "flag": true}));
    }

    #[test]
    fn nested_structures_parse() {
        let value =
            parse_lenient("{'result': {'stories': [{'id': 1}, {'id': 2}]}}").expect("parses");
        assert_eq!(value, json!({"result": {"stories": [{"id": 1}, {"id": 2}]}}));
    }

    #[test]
    fn exponent_numbers_survive_the_rewrite() {
        let value = parse_lenient("{'big': 1e5, 'small': 2.5E-3}").expect("parses");
        assert_eq!(value, json!({"big": 1e5, "small": 2.5e-3}));
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(parse_lenient("{'msg': 'never closed}").is_none());
    }

    #[test]
    fn rejects_plain_prose() {
        assert!(parse_lenient("this is not an object at all").is_none());
    }

    #[test]
    fn rejects_python_set_syntax() {
        assert!(parse_lenient("{1, 2, 3}").is_none());
    }
}
