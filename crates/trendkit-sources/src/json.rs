//! Tolerant JSON parsing for unofficial upstream payloads.

use serde::de::DeserializeOwned;
use serde_json::Value;

const XSSI_GUARD: &str = ")]}'";

/// Strict parse; `None` instead of an error.
#[must_use]
pub fn safe_json_parse(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// Strict parse into `T`; `None` instead of an error.
#[must_use]
pub fn safe_json_parse_as<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_str(text).ok()
}

/// Parse JSON, repairing common non-standard wrappers on failure.
///
/// A strict parse is tried first. When it fails the text is cleaned of a
/// byte-order mark, an XSSI guard line, a JSONP callback wrapper, `//` and
/// `/* */` comments, and trailing commas before `}` or `]`, then parsed again.
/// Comments and commas inside string literals are left untouched.
#[must_use]
pub fn lenient_json_parse(text: &str) -> Option<Value> {
    if let Some(v) = safe_json_parse(text) {
        return Some(v);
    }

    let mut body = text.trim_start_matches('\u{feff}').trim();
    if let Some(rest) = body.strip_prefix(XSSI_GUARD) {
        body = rest.trim_start_matches(',').trim_start();
    }
    let body = strip_jsonp(body);
    let cleaned = strip_trailing_commas(&strip_comments(body));
    safe_json_parse(&cleaned)
}

/// `callback({...});` → `{...}`. Returns the input unchanged when it is not
/// wrapped.
fn strip_jsonp(body: &str) -> &str {
    let Some(open) = body.find('(') else {
        return body;
    };
    let callee = &body[..open];
    let is_identifier = !callee.is_empty()
        && callee
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.');
    if !is_identifier {
        return body;
    }
    let tail = body.trim_end().trim_end_matches(';').trim_end();
    match tail.strip_suffix(')') {
        Some(inner) if inner.len() > open => inner[open + 1..].trim(),
        _ => body,
    }
}

fn strip_comments(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_trailing_commas(body: &str) -> String {
    let chars: Vec<char> = body.chars().collect();
    let mut out = String::with_capacity(body.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
