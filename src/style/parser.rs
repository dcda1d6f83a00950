//! MapCSS-subset stylesheet parser
//!
//! ```text
//! area|z1-16[natural=water], way|z12-[waterway] {
//!     builder: mesh;
//!     fill-color: #4a80f5;
//! }
//! ```

use super::rules::{Condition, Declaration, Rule, Selector, SelectorTarget, StyleSheet};
use crate::error::StyleError;
use crate::geo::{LodRange, MAX_LOD};
use std::path::Path;

/// Read and compile a stylesheet file
pub fn load_stylesheet(path: &Path) -> Result<StyleSheet, StyleError> {
    let source = std::fs::read_to_string(path).map_err(|source| StyleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_stylesheet(&source)
}

/// Compile stylesheet source text
pub fn parse_stylesheet(source: &str) -> Result<StyleSheet, StyleError> {
    let mut parser = Parser::new(source);
    let mut rules = Vec::new();
    loop {
        parser.skip_trivia()?;
        if parser.at_end() {
            break;
        }
        rules.push(parser.parse_rule()?);
    }
    Ok(StyleSheet { rules })
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self { chars: source.chars().collect(), pos: 0, line: 1 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> StyleError {
        StyleError::Syntax { line: self.line, message: message.into() }
    }

    fn expect(&mut self, expected: char) -> Result<(), StyleError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    /// Skip whitespace, `/* */` and `//` comments
    fn skip_trivia(&mut self) -> Result<(), StyleError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    let start_line = self.line;
                    self.pos += 2;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(StyleError::Syntax {
                                    line: start_line,
                                    message: "unterminated comment".to_string(),
                                })
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Tag key as written in selectors, where `:` namespaces (`name:en`)
    fn read_key(&mut self) -> String {
        self.read_word(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'))
    }

    /// Declaration property name; `:` separates it from the value
    fn read_property(&mut self) -> String {
        self.read_word(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }

    fn read_word(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut key = String::new();
        while let Some(c) = self.peek() {
            if accept(c) {
                key.push(c);
                self.bump();
            } else {
                break;
            }
        }
        key
    }

    fn read_number(&mut self) -> Option<u32> {
        let mut digits = String::new();
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            digits.push(c);
            self.bump();
        }
        digits.parse().ok()
    }

    fn parse_rule(&mut self) -> Result<Rule, StyleError> {
        let mut selectors = vec![self.parse_selector()?];
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(',') => {
                    self.bump();
                    self.skip_trivia()?;
                    selectors.push(self.parse_selector()?);
                }
                Some('{') => break,
                Some(c) => return Err(self.error(format!("unexpected '{}' after selector", c))),
                None => return Err(self.error("expected '{' after selector")),
            }
        }

        self.expect('{')?;
        let mut declarations = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some('}') => {
                    self.bump();
                    break;
                }
                Some(_) => declarations.push(self.parse_declaration()?),
                None => return Err(self.error("unterminated declaration block")),
            }
        }
        Ok(Rule { selectors, declarations })
    }

    fn parse_selector(&mut self) -> Result<Selector, StyleError> {
        let target = if self.peek() == Some('*') {
            self.bump();
            SelectorTarget::Any
        } else {
            match self.read_key().as_str() {
                "node" => SelectorTarget::Node,
                "way" => SelectorTarget::Way,
                "area" => SelectorTarget::Area,
                "" => return Err(self.error("expected selector")),
                other => return Err(self.error(format!("unknown selector '{}'", other))),
            }
        };

        let lods = if self.peek() == Some('|') {
            self.bump();
            self.parse_zoom()?
        } else {
            LodRange::full()
        };

        let mut conditions = Vec::new();
        while self.peek() == Some('[') {
            self.bump();
            conditions.push(self.parse_condition()?);
        }
        Ok(Selector { target, lods, conditions })
    }

    fn parse_zoom(&mut self) -> Result<LodRange, StyleError> {
        self.expect('z')?;
        let start = self.read_number().ok_or_else(|| self.error("expected zoom level after '|z'"))?;
        let end = if self.peek() == Some('-') {
            self.bump();
            self.read_number().unwrap_or(MAX_LOD as u32)
        } else {
            start
        };
        let (start, end) = match (u8::try_from(start), u8::try_from(end)) {
            (Ok(s), Ok(e)) => (s, e),
            _ => return Err(self.error(format!("zoom range z{}-{} out of bounds", start, end))),
        };
        LodRange::new(start, end).map_err(|e| self.error(e.to_string()))
    }

    fn parse_condition(&mut self) -> Result<Condition, StyleError> {
        self.skip_inline_space();
        let negated = self.peek() == Some('!');
        if negated {
            self.bump();
            self.skip_inline_space();
        }
        let key = self.read_key();
        if key.is_empty() {
            return Err(self.error("expected tag key in condition"));
        }
        self.skip_inline_space();

        let op = match (self.peek(), self.peek_at(1)) {
            (Some(']'), _) => {
                self.bump();
                return Ok(if negated { Condition::NotExists(key) } else { Condition::Exists(key) });
            }
            (Some('!'), Some('=')) => "!=",
            (Some('='), _) => "=",
            (Some('<'), _) => "<",
            (Some('>'), _) => ">",
            (Some(c), _) => return Err(self.error(format!("unexpected '{}' in condition", c))),
            (None, _) => return Err(self.error("unterminated condition")),
        };
        if negated {
            return Err(self.error("'!' cannot be combined with a comparison"));
        }
        self.pos += op.len();

        let value = self.read_value(&[']'])?;
        self.expect(']')?;
        if value.is_empty() {
            return Err(self.error(format!("missing value for '{}'", key)));
        }

        let number = |v: &str| {
            v.parse::<f64>()
                .map_err(|_| self.error(format!("'{}' is not a number", v)))
        };
        Ok(match op {
            "=" => Condition::Equals(key, value),
            "!=" => Condition::NotEquals(key, value),
            "<" => Condition::Less(key, number(&value)?),
            _ => Condition::Greater(key, number(&value)?),
        })
    }

    fn parse_declaration(&mut self) -> Result<Declaration, StyleError> {
        let key = self.read_property();
        if key.is_empty() {
            let found = self.peek().map(String::from).unwrap_or_default();
            return Err(self.error(format!("expected property name, found '{}'", found)));
        }
        self.skip_inline_space();
        self.expect(':')?;
        let value = self.read_value(&[';', '}'])?;
        if value.is_empty() {
            return Err(self.error(format!("missing value for property '{}'", key)));
        }
        if self.peek() == Some(';') {
            self.bump();
        }
        Ok(Declaration { key, value })
    }

    /// Read up to one of `terminators`, honouring double-quoted strings
    fn read_value(&mut self, terminators: &[char]) -> Result<String, StyleError> {
        let mut value = String::new();
        let mut quoted = false;
        loop {
            match self.peek() {
                None => return Err(self.error("unexpected end of input in value")),
                Some('"') => {
                    quoted = !quoted;
                    self.bump();
                }
                Some('\n') if quoted => return Err(self.error("unterminated string")),
                Some(c) if !quoted && terminators.contains(&c) => break,
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        Ok(value.trim().to_string())
    }

    fn skip_inline_space(&mut self) {
        while self.peek().is_some_and(|c| c == ' ' || c == '\t') {
            self.bump();
        }
    }
}
