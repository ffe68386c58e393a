//! `{{ dotted.key }}` substitution over strings.
//!
//! A template is a pure function of `(template, lookup)`: occurrences of
//! `{{key}}` (inner whitespace trimmed) are replaced by the stringified
//! value found at `key` via a dotted-path lookup. Unresolved keys are left
//! verbatim, which makes the substitution idempotent: running it twice on a
//! string with no resolvable keys returns the same string.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").expect("static template pattern"))
}

/// Render every `{{dotted.key}}` occurrence in `template`, resolving each key
/// against `lookup`. Unresolved or non-stringifiable values leave the
/// original `{{...}}` token untouched.
pub fn render(template: &str, lookup: &dyn Fn(&str) -> Option<Value>) -> String {
    pattern()
        .replace_all(template, |caps: &regex::Captures| {
            let key = caps[1].trim();
            match lookup(key).and_then(stringify) {
                Some(s) => s,
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Stringify a resolved value for interpolation. Objects and arrays are not
/// stringifiable (they are not meaningful substring substitutions) and leave
/// the original token in place.
fn stringify(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
