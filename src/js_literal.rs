// js_literal.rs
//
// Recursive-descent parser for the subset of JavaScript used in static data
// modules: object and array literals holding strings, numbers, booleans and
// null/undefined. Anything executable is rejected.
use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 128;

/// Parses one literal starting at the beginning of `src` (leading whitespace
/// and comments allowed). Returns the value and the number of bytes consumed.
pub fn parse_js_literal(src: &str) -> Result<(Value, usize)> {
    let mut parser = Parser { src, pos: 0, depth: 0 };
    parser.skip_trivia()?;
    let value = parser.parse_value()?;
    Ok((value, parser.pos))
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, message: &str) -> anyhow::Error {
        let consumed = &self.src[..self.pos];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0) + 1;
        anyhow!("{} at line {}, column {}", message, line, column)
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.rest().starts_with("//") => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.rest().starts_with("/*") => {
                    let end = self.rest()[2..]
                        .find("*/")
                        .ok_or_else(|| self.error("Unterminated block comment"))?;
                    self.pos += end + 4;
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek() {
            Some('{') => self.nested(|p| p.parse_object()),
            Some('[') => self.nested(|p| p.parse_array()),
            Some(q @ ('"' | '\'' | '`')) => Ok(Value::String(self.parse_string(q)?)),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if is_ident_start(c) => {
                let start = self.pos;
                let word = self.parse_identifier();
                match word {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" | "undefined" => Ok(Value::Null),
                    other => {
                        let other = other.to_string();
                        self.pos = start;
                        Err(self.error(&format!("Unsupported expression `{}`", other)))
                    }
                }
            }
            Some(c) => Err(self.error(&format!("Unexpected character `{}`", c))),
            None => Err(self.error("Unexpected end of input")),
        }
    }

    fn nested<F>(&mut self, parse: F) -> Result<Value>
    where
        F: FnOnce(&mut Self) -> Result<Value>,
    {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("Literal nested too deeply"));
        }
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn parse_array(&mut self) -> Result<Value> {
        self.bump(); // [
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(']') => {
                    self.bump();
                    return Ok(Value::Array(items));
                }
                Some(',') => return Err(self.error("Array holes are not supported")),
                Some('.') if self.rest().starts_with("...") => {
                    return Err(self.error("Spread elements are not supported"))
                }
                _ => {}
            }
            items.push(self.parse_value()?);
            self.skip_trivia()?;
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Value::Array(items)),
                _ => return Err(self.error("Expected `,` or `]` in array")),
            }
        }
    }

    fn parse_object(&mut self) -> Result<Value> {
        self.bump(); // {
        let mut map = Map::new();
        loop {
            self.skip_trivia()?;
            let key = match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(Value::Object(map));
                }
                Some(q @ ('"' | '\'')) => self.parse_string(q)?,
                Some(c) if c.is_ascii_digit() => self.parse_number()?.to_string(),
                Some(c) if is_ident_start(c) => self.parse_identifier().to_string(),
                Some('.') if self.rest().starts_with("...") => {
                    return Err(self.error("Spread properties are not supported"))
                }
                Some('[') => return Err(self.error("Computed keys are not supported")),
                Some(c) => return Err(self.error(&format!("Unexpected character `{}` in object key", c))),
                None => return Err(self.error("Unterminated object")),
            };
            self.skip_trivia()?;
            match self.peek() {
                Some(':') => {
                    self.bump();
                }
                Some(',') | Some('}') => {
                    return Err(self.error(&format!("Shorthand property `{}` is not supported", key)))
                }
                Some('(') => return Err(self.error(&format!("Method `{}` is not supported", key))),
                _ => return Err(self.error("Expected `:` after object key")),
            }
            self.skip_trivia()?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_trivia()?;
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                _ => return Err(self.error("Expected `,` or `}` in object")),
            }
        }
    }

    fn parse_identifier(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                self.bump();
            } else {
                break;
            }
        }
        &self.src[start..self.pos]
    }

    fn parse_string(&mut self, quote: char) -> Result<String> {
        self.bump();
        let mut out = String::new();
        loop {
            let c = self.bump().ok_or_else(|| self.error("Unterminated string"))?;
            match c {
                c if c == quote => return Ok(out),
                '$' if quote == '`' && self.peek() == Some('{') => {
                    return Err(self.error("Template interpolation is not supported"))
                }
                '\n' | '\r' if quote != '`' => return Err(self.error("Line break inside string")),
                '\\' => self.parse_escape(&mut out)?,
                c => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<()> {
        let c = self.bump().ok_or_else(|| self.error("Unterminated escape"))?;
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            // line continuation
            '\n' => {}
            '\r' => {
                if self.peek() == Some('\n') {
                    self.bump();
                }
            }
            'x' => {
                let code = self.hex_digits(2)?;
                out.push(char::from_u32(code).ok_or_else(|| self.error("Invalid \\x escape"))?);
            }
            'u' => {
                let code = if self.peek() == Some('{') {
                    self.bump();
                    let end = self.rest().find('}').ok_or_else(|| self.error("Unterminated \\u{} escape"))?;
                    let digits = &self.rest()[..end];
                    if digits.is_empty() || !digits.chars().all(|d| d.is_ascii_hexdigit()) {
                        return Err(self.error("Invalid \\u{} escape"));
                    }
                    let code = u32::from_str_radix(digits, 16).map_err(|_| self.error("Invalid \\u{} escape"))?;
                    self.pos += end + 1;
                    code
                } else {
                    let high = self.hex_digits(4)?;
                    if (0xD800..0xDC00).contains(&high) && self.rest().starts_with("\\u") {
                        let resume = self.pos;
                        self.pos += 2;
                        match self.hex_digits(4) {
                            Ok(low) if (0xDC00..0xE000).contains(&low) => {
                                0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                            }
                            // lone high surrogate; the next escape is read on its own
                            _ => {
                                self.pos = resume;
                                high
                            }
                        }
                    } else {
                        high
                    }
                };
                out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn hex_digits(&mut self, count: usize) -> Result<u32> {
        let digits = self.rest().get(..count).ok_or_else(|| self.error("Truncated escape"))?;
        if !digits.chars().all(|d| d.is_ascii_hexdigit()) {
            return Err(self.error("Invalid hex escape"));
        }
        let code = u32::from_str_radix(digits, 16).map_err(|_| self.error("Invalid hex escape"))?;
        self.pos += count;
        Ok(code)
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        let mut negative = false;
        if let Some(sign @ ('-' | '+')) = self.peek() {
            negative = sign == '-';
            self.bump();
        }

        let rest = self.rest();
        if rest.starts_with("0x") || rest.starts_with("0X") {
            self.pos += 2;
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit() || c == '_') {
                self.bump();
            }
            let digits = self.src[digits_start..self.pos].replace('_', "");
            let magnitude = i64::from_str_radix(&digits, 16).map_err(|_| self.error("Invalid hex number"))?;
            return Ok(Value::Number(Number::from(if negative { -magnitude } else { magnitude })));
        }

        let digits_start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if let Some('+' | '-') = self.peek() {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }
        let text = self.src[digits_start..self.pos].replace('_', "");
        if text.is_empty() || text == "." {
            self.pos = start;
            return Err(self.error("Invalid number"));
        }
        let signed = if negative { format!("-{}", text) } else { text };

        if !is_float {
            if let Ok(i) = signed.parse::<i64>() {
                return Ok(Value::Number(Number::from(i)));
            }
        }
        let f = signed.parse::<f64>().map_err(|_| self.error("Invalid number"))?;
        Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| self.error("Number is not finite"))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Rejects trailing garbage after a literal other than `;`, whitespace and comments.
pub fn ensure_statement_end(rest: &str) -> Result<()> {
    let trimmed = rest.trim_start();
    let trimmed = trimmed.strip_prefix(';').unwrap_or(trimmed);
    let mut parser = Parser { src: trimmed, pos: 0, depth: 0 };
    parser.skip_trivia()?;
    match parser.peek() {
        None => Ok(()),
        Some(c) if is_ident_start(c) => Ok(()),
        Some(c) => bail!("Unexpected `{}` after literal", c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(src: &str) -> Value {
        parse_js_literal(src).unwrap().0
    }

    #[test]
    fn test_js_object_literal() {
        let src = r#"[
            // Stelvio
            {
                id: 'stelvio',
                name: "Passo dello Stelvio",
                altitude: 2758,
                gradient: 7.4,
                coordinates: [46.5286, 10.4531,],
                tags: [`alps`, 'italy'],
                paved: true,
                closed: undefined,
                "quoted-key": null,
            },
            /* second entry */
            { id: 'galibier', 'name': 'Col du Galibier', 2: -0x10 },
        ];"#;
        let value = parse(src);
        assert_eq!(
            value,
            json!([
                {
                    "id": "stelvio",
                    "name": "Passo dello Stelvio",
                    "altitude": 2758,
                    "gradient": 7.4,
                    "coordinates": [46.5286, 10.4531],
                    "tags": ["alps", "italy"],
                    "paved": true,
                    "closed": null,
                    "quoted-key": null
                },
                {"id": "galibier", "name": "Col du Galibier", "2": -16}
            ])
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(parse(r#"'L\'Alpe d\'Huez'"#), json!("L'Alpe d'Huez"));
        assert_eq!(parse(r#""café \x41\n""#), json!("café A\n"));
        assert_eq!(parse(r#"'\u{1F6B4}'"#), json!("\u{1F6B4}"));
    }

    #[test]
    fn test_hex_escape_requires_hex_digits() {
        assert!(parse_js_literal(r#"'\x+1'"#).is_err());
        assert!(parse_js_literal(r#"'\u+123'"#).is_err());
        assert!(parse_js_literal(r#"'\u{+41}'"#).is_err());
        assert!(parse_js_literal(r#"'\u{}'"#).is_err());
    }

    #[test]
    fn test_surrogate_pairs() {
        assert_eq!(parse(r#"'\uD83D\uDEB4'"#), json!("\u{1F6B4}"));
        // high surrogate not followed by a low one
        assert_eq!(parse(r#"'\uD83D\u0041'"#), json!("\u{FFFD}A"));
        assert_eq!(parse(r#"'\uD83Dx'"#), json!("\u{FFFD}x"));
    }

    #[test]
    fn test_consumed_length_stops_at_literal_end() {
        let (value, consumed) = parse_js_literal("[1, 2] ; export default x").unwrap();
        assert_eq!(value, json!([1, 2]));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_rejects_code() {
        for src in ["[foo()]", "{ a }", "[...others]", "{ ...base, a: 1 }", "[`x ${y}`]", "{ [k]: 1 }", "[1,,2]"] {
            assert!(parse_js_literal(src).is_err(), "should reject {}", src);
        }
    }

    #[test]
    fn test_error_reports_position() {
        let err = parse_js_literal("[\n  1,\n  oops\n]").unwrap_err().to_string();
        assert!(err.contains("line 3, column 3"), "{}", err);
    }

    #[test]
    fn test_unterminated_input() {
        assert!(parse_js_literal("[{ id: 'a' ").is_err());
        assert!(parse_js_literal("'abc").is_err());
    }

    #[test]
    fn test_statement_end() {
        assert!(ensure_statement_end(";\n// done\n").is_ok());
        assert!(ensure_statement_end("\nexport default cols;").is_ok());
        assert!(ensure_statement_end(" + extra").is_err());
    }
}
