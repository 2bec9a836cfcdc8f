use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]+)\}").unwrap());

/// Walk `value` along a dot-delimited `path`.
///
/// Array elements are addressed by their decimal index.
pub fn reach<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(value, |node, segment| match node {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Replace every `{path}` placeholder in `template` with the value found at
/// `path` inside `context`.
///
/// Missing values and nulls render as the empty string; strings render
/// without quotes; everything else renders as compact JSON.
pub fn reach_template(context: &JsonValue, template: &str) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            match reach(context, caps[1].trim()) {
                None | Some(JsonValue::Null) => String::new(),
                Some(JsonValue::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}
