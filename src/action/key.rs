//! Cache key derivation for memoized actions

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Number, Value as JsonValue};

use crate::core::{Additions, Pattern};

/// Key used when a memoized action is called without additions
pub const EMPTY_KEY: &str = "{}";

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`, as URI components do.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    Key(String),
    /// The parameters cannot be memoized; the call must go straight to the RPC layer
    NotCacheable,
}

/// Derive the cache key of a set of call parameters.
///
/// Keys follow the enumeration order of the parameters, no sorting is done.
/// Nested values (objects, arrays, null) make the whole set non-cacheable.
pub fn generate_key(parameters: Option<&Additions>) -> CacheKey {
    let Some(parameters) = parameters else {
        return CacheKey::Key(EMPTY_KEY.to_string());
    };
    if parameters.is_blank() {
        return CacheKey::Key(EMPTY_KEY.to_string());
    }

    match parameters.to_pattern() {
        Ok(pattern) => key_for(&pattern),
        Err(e) => {
            log::debug!("Parameters are not cacheable: {e}");
            CacheKey::NotCacheable
        }
    }
}

/// Derive the cache key of an already structured parameter set
pub fn key_for(pattern: &Pattern) -> CacheKey {
    let mut pairs = Vec::with_capacity(pattern.len());
    for (key, value) in pattern.iter() {
        let Some(value) = scalar_text(value) else {
            return CacheKey::NotCacheable;
        };
        pairs.push(format!("{}:{}", encode(key), encode(&value)));
    }
    CacheKey::Key(pairs.join(","))
}

fn encode(text: &str) -> String {
    utf8_percent_encode(text, COMPONENT).to_string()
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(number_text(n)),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() => float_text(f),
        _ => n.to_string(),
    }
}

/// Shortest round-trip digits, laid out the way JavaScript prints numbers:
/// plain notation for decimal exponents in `[-7, 21)`, `1.5e+300` otherwise.
fn float_text(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    let sci = format!("{:e}", f.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let n = exp.parse::<i32>().unwrap_or(0) + 1;

    let body = if k <= n && n <= 21 {
        format!("{digits}{}", "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{int}.{frac}")
    } else if -6 < n && n <= 0 {
        format!("0.{}{digits}", "0".repeat(-n as usize))
    } else {
        let e = n - 1;
        let sign = if e < 0 { '-' } else { '+' };
        match digits.split_at(1) {
            (first, "") => format!("{first}e{sign}{}", e.abs()),
            (first, rest) => format!("{first}.{rest}e{sign}{}", e.abs()),
        }
    };

    if f < 0.0 {
        format!("-{body}")
    } else {
        body
    }
}
