//! Relaxed JSON reader for compact action patterns.
//!
//! Accepts the shorthand used when binding actions and passing additions:
//! bare keys, bare string values, single or double quoted strings, nested
//! `{}` and `[]`, and an optional pair of outer braces.
//!
//! ```text
//! generate:id
//! role:user, cmd:load, id:42
//! {sys:'mail', to:[a, b], opts:{urgent:true}}
//! ```

use serde_json::{Map, Number, Value as JsonValue};

use crate::core::{ActError, ActResult};

/// Parse `text` into a JSON object.
///
/// Empty input yields an empty object.
pub fn parse_relaxed(text: &str) -> ActResult<Map<String, JsonValue>> {
    let mut parser = Parser::new(text);
    parser.skip_ws();

    let map = if parser.peek() == Some('{') {
        parser.bump();
        let map = parser.parse_members(Some('}'))?;
        parser.expect('}')?;
        map
    } else {
        parser.parse_members(None)?
    };

    parser.skip_ws();
    if let Some(c) = parser.peek() {
        return Err(parser.error(&format!("unexpected trailing '{c}'")));
    }
    Ok(map)
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: char) -> ActResult<()> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(self.error(&format!("expected '{want}', found '{c}'"))),
            None => Err(self.error(&format!("expected '{want}', found end of input"))),
        }
    }

    fn error(&self, reason: &str) -> ActError {
        ActError::Parse(format!(
            "{reason} at offset {} in '{}'",
            self.pos, self.source
        ))
    }

    fn parse_members(&mut self, close: Option<char>) -> ActResult<Map<String, JsonValue>> {
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(c) if Some(c) == close => break,
                Some(',') => {
                    self.bump();
                    continue;
                }
                _ => {}
            }

            let key = self.parse_key()?;
            self.expect(':')?;
            let value = self.parse_value()?;
            map.insert(key, value);

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if Some(c) == close => {}
                None => {}
                Some(c) => return Err(self.error(&format!("unexpected '{c}' after value"))),
            }
        }
        Ok(map)
    }

    fn parse_key(&mut self) -> ActResult<String> {
        self.skip_ws();
        if let Some(quote @ ('"' | '\'')) = self.peek() {
            self.bump();
            return self.parse_quoted(quote);
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ':' || c == ',' || c == '{' || c == '}' || c == '[' || c == ']' {
                break;
            }
            self.pos += 1;
        }
        let key: String = self.chars[start..self.pos].iter().collect();
        let key = key.trim();
        if key.is_empty() {
            return Err(self.error("missing key"));
        }
        Ok(key.to_string())
    }

    fn parse_value(&mut self) -> ActResult<JsonValue> {
        self.skip_ws();
        match self.peek() {
            Some('{') => {
                self.bump();
                let map = self.parse_members(Some('}'))?;
                self.expect('}')?;
                Ok(JsonValue::Object(map))
            }
            Some('[') => {
                self.bump();
                self.parse_items()
            }
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                self.parse_quoted(quote).map(JsonValue::String)
            }
            _ => Ok(self.parse_bare()),
        }
    }

    fn parse_items(&mut self) -> ActResult<JsonValue> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.error("unterminated array")),
                Some(']') => {
                    self.bump();
                    return Ok(JsonValue::Array(items));
                }
                Some(',') => {
                    self.bump();
                }
                _ => items.push(self.parse_value()?),
            }
        }
    }

    fn parse_quoted(&mut self, quote: char) -> ActResult<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_bare(&mut self) -> JsonValue {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ',' || c == '}' || c == ']' {
                break;
            }
            self.pos += 1;
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        scalar(token.trim())
    }
}

fn scalar(token: &str) -> JsonValue {
    match token {
        "" | "null" => JsonValue::Null,
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        _ => {
            if let Ok(n) = token.parse::<i64>() {
                return JsonValue::Number(n.into());
            }
            token
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(Number::from_f64)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(token.to_string()))
        }
    }
}
