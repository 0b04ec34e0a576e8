//! Helpers for the JSON blobs marketplaces embed in their pages.

use serde_json::{Map, Value};

use crate::normalize::parse_price;

/// Collect every object in `node` (depth-first, document order) that
/// satisfies `matches`.
pub fn collect_objects<'a, P>(node: &'a Value, matches: &P, out: &mut Vec<&'a Map<String, Value>>)
where
    P: Fn(&Map<String, Value>) -> bool,
{
    match node {
        Value::Object(map) => {
            if matches(map) {
                out.push(map);
            }
            for value in map.values() {
                collect_objects(value, matches, out);
            }
        }
        Value::Array(items) => {
            for value in items {
                collect_objects(value, matches, out);
            }
        }
        _ => {}
    }
}

/// True when `map` has at least one of `keys`
pub fn has_any(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|k| map.contains_key(*k))
}

/// Cut the balanced `{...}` object starting at the first `{` at or after
/// `start`, honoring string literals and escapes.
pub fn extract_json_object(text: &str, start: usize) -> Option<&str> {
    let open = start + text.get(start..)?.find('{')?;
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;

    for (offset, ch) in text[open..].char_indices() {
        if in_str {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_str = false;
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[open..open + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// First positive number found in a loosely typed price value.
///
/// Numbers are taken as-is, strings go through [`parse_price`], objects are
/// searched under `value`, `amount`, `min`, `max`, arrays element by element.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(parse_price(s)).filter(|v| *v > 0.0),
        Value::Object(map) => ["value", "amount", "min", "max"]
            .iter()
            .filter_map(|k| map.get(*k))
            .filter_map(numeric)
            .find(|v| *v > 0.0),
        Value::Array(items) => items.iter().filter_map(numeric).find(|v| *v > 0.0),
        _ => None,
    }
}

/// Non-empty string or number at `key`, rendered as a string
pub fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_nested_matches_in_order() {
        let doc = json!({
            "props": {
                "ads": [
                    {"subject": "A", "url": "/a"},
                    {"wrapper": {"subject": "B", "url": "/b"}},
                    {"subject": "no url"}
                ]
            }
        });
        let mut out = Vec::new();
        collect_objects(&doc, &|m| m.contains_key("subject") && m.contains_key("url"), &mut out);
        let subjects: Vec<_> = out.iter().filter_map(|m| str_field(m, "subject")).collect();
        assert_eq!(subjects, vec!["A", "B"]);
    }

    #[test]
    fn extracts_balanced_object_with_braces_in_strings() {
        let text = r#"var x = {"a": "}{", "b": {"c": "\"}"}} trailing"#;
        let obj = extract_json_object(text, 0).unwrap();
        let parsed: Value = serde_json::from_str(obj).unwrap();
        assert_eq!(parsed["a"], "}{");
        assert_eq!(parsed["b"]["c"], "\"}");
    }

    #[test]
    fn unbalanced_object_yields_none() {
        assert!(extract_json_object(r#"{"a": {"b": 1}"#, 0).is_none());
        assert!(extract_json_object("no braces", 0).is_none());
        assert!(extract_json_object("{}", 10).is_none());
    }

    #[test]
    fn numeric_walks_loose_shapes() {
        assert_eq!(numeric(&json!(12.5)), Some(12.5));
        assert_eq!(numeric(&json!("EUR 9,90")), Some(9.9));
        assert_eq!(numeric(&json!({"value": {"amount": "3.20"}})), Some(3.2));
        assert_eq!(numeric(&json!([0, "free", 7])), Some(7.0));
        assert_eq!(numeric(&json!("gratuit")), None);
        assert_eq!(numeric(&json!(null)), None);
    }
}
