//! Declarative block syntax for the visit reporter.
//!
//! ```text
//! darkvisitors {
//!     endpoint     https://api.darkvisitors.com/visits
//!     access_token {$DARKVISITORS_TOKEN}
//! }
//! ```
//!
//! # Lexing
//! - Whitespace separates tokens, newlines end a line
//! - `#` at the start of a token comments out the rest of the line
//! - `"..."` quotes (with `\"`), `` `...` `` quotes verbatim
//! - `{$VAR}` / `{$VAR:default}` are expanded from the environment before
//!   lexing; unset variables without a default expand to nothing
//!
//! Runtime placeholders such as `{env.VAR}` are left alone here and expanded
//! when the config is provisioned.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

use crate::config::visits::VisitsConfig;

/// Name of the directive opening the block.
pub const DIRECTIVE_NAME: &str = "darkvisitors";

/// A parse failure, located at the line of the offending token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct DirectiveError {
    pub line: usize,
    pub message: String,
}

impl DirectiveError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    line: usize,
    quoted: bool,
}

impl Token {
    fn is(&self, punct: &str) -> bool {
        !self.quoted && self.text == punct
    }
}

/// Parse a `darkvisitors { ... }` block using the process environment for
/// `{$VAR}` substitution.
pub fn parse_directive(input: &str) -> Result<VisitsConfig, DirectiveError> {
    parse_directive_with_env(input, |name| std::env::var(name).ok())
}

/// Parse a `darkvisitors { ... }` block with a custom environment lookup.
pub fn parse_directive_with_env<F>(input: &str, env: F) -> Result<VisitsConfig, DirectiveError>
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = expand_env(input, env);
    let tokens = tokenize(&expanded)?;
    Dispenser::new(tokens).parse()
}

fn expand_env<F>(input: &str, env: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{$") {
        output.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let Some(end) = tail.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let body = &tail[..end];
        let (name, default) = match body.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };
        if let Some(value) = env(name).or_else(|| default.map(str::to_string)) {
            output.push_str(&value);
        }
        rest = &tail[end + 1..];
    }

    output.push_str(rest);
    output
}

fn tokenize(input: &str) -> Result<Vec<Token>, DirectiveError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while chars.peek().is_some_and(|&c| c != '\n') {
                    chars.next();
                }
            }
            '"' | '`' => {
                let start_line = line;
                chars.next();
                let text = read_quoted(&mut chars, c, &mut line)
                    .ok_or_else(|| DirectiveError::new(start_line, "unterminated quoted string"))?;
                tokens.push(Token {
                    text,
                    line: start_line,
                    quoted: true,
                });
            }
            _ => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                tokens.push(Token {
                    text,
                    line,
                    quoted: false,
                });
            }
        }
    }

    Ok(tokens)
}

/// Read up to the closing `quote`. Returns `None` if input ends first.
fn read_quoted(chars: &mut Peekable<Chars<'_>>, quote: char, line: &mut usize) -> Option<String> {
    let mut text = String::new();

    while let Some(c) = chars.next() {
        match c {
            c if c == quote => return Some(text),
            '\\' if quote == '"' && chars.peek() == Some(&'"') => {
                chars.next();
                text.push('"');
            }
            '\n' => {
                *line += 1;
                text.push(c);
            }
            _ => text.push(c),
        }
    }

    None
}

/// Walks the token stream of a single directive.
struct Dispenser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Dispenser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, cursor: 0 }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    /// Next token, only if it is on `line`.
    fn next_on_line(&mut self, line: usize) -> Option<Token> {
        match self.tokens.get(self.cursor) {
            Some(token) if token.line == line => self.next(),
            _ => None,
        }
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|t| t.line).unwrap_or(1)
    }

    fn parse(mut self) -> Result<VisitsConfig, DirectiveError> {
        let name = self
            .next()
            .ok_or_else(|| DirectiveError::new(1, format!("missing directive '{}'", DIRECTIVE_NAME)))?;
        if name.text != DIRECTIVE_NAME || name.quoted {
            return Err(DirectiveError::new(
                name.line,
                format!("expected directive '{}', found '{}'", DIRECTIVE_NAME, name.text),
            ));
        }

        let mut config = VisitsConfig::default();

        if let Some(token) = self.next_on_line(name.line) {
            if !token.is("{") {
                return Err(DirectiveError::new(
                    token.line,
                    format!("unexpected argument '{}'", token.text),
                ));
            }
            self.parse_block(token.line, &mut config)?;
        }

        if let Some(token) = self.next() {
            return Err(DirectiveError::new(
                token.line,
                format!("unexpected token '{}'", token.text),
            ));
        }

        if config.access_token.is_empty() {
            return Err(DirectiveError::new(name.line, "missing access token"));
        }

        Ok(config)
    }

    fn parse_block(&mut self, open_line: usize, config: &mut VisitsConfig) -> Result<(), DirectiveError> {
        if let Some(token) = self.next_on_line(open_line) {
            return Err(DirectiveError::new(
                token.line,
                format!("unexpected token '{}' after '{{' on the same line", token.text),
            ));
        }

        loop {
            let Some(sub) = self.next() else {
                return Err(DirectiveError::new(self.last_line(), "unclosed block, expected '}'"));
            };

            if sub.is("}") {
                if let Some(token) = self.next_on_line(sub.line) {
                    return Err(DirectiveError::new(
                        token.line,
                        format!("unexpected argument '{}'", token.text),
                    ));
                }
                return Ok(());
            }

            let slot = match sub.text.as_str() {
                "endpoint" if !sub.quoted => &mut config.endpoint,
                "access_token" if !sub.quoted => &mut config.access_token,
                _ => {
                    return Err(DirectiveError::new(
                        sub.line,
                        format!("unrecognized subdirective '{}'", sub.text),
                    ));
                }
            };

            let value = match self.next_on_line(sub.line) {
                Some(value) if !value.is("{") && !value.is("}") => value,
                _ => {
                    return Err(DirectiveError::new(
                        sub.line,
                        format!("wrong argument count or unexpected line ending after '{}'", sub.text),
                    ));
                }
            };
            *slot = value.text;

            if let Some(extra) = self.next_on_line(sub.line) {
                return Err(DirectiveError::new(
                    extra.line,
                    format!("unexpected argument '{}'", extra.text),
                ));
            }
        }
    }
}
