//! Global placeholder replacement for configuration values.
//!
//! # Responsibilities
//! - Expand `{env.NAME}` from the process environment
//! - Expand `{system.os}`, `{system.arch}`, `{system.wd}`
//! - Replace unknown placeholders with the empty string
//!
//! # Design Decisions
//! - `\{` and `\}` produce literal braces
//! - An unclosed `{` is kept verbatim along with the rest of the input
//! - Lookup is pluggable so tests do not mutate the process environment

use std::collections::HashMap;

/// Resolves a placeholder key (the text between the braces) to its value.
pub trait PlaceholderSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Placeholders backed by the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPlaceholders;

impl PlaceholderSource for SystemPlaceholders {
    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(name) = key.strip_prefix("env.") {
            return std::env::var(name).ok();
        }

        match key {
            "system.os" => Some(std::env::consts::OS.to_string()),
            "system.arch" => Some(std::env::consts::ARCH.to_string()),
            "system.wd" => std::env::current_dir()
                .ok()
                .map(|dir| dir.display().to_string()),
            _ => None,
        }
    }
}

/// Fixed key/value placeholders.
impl PlaceholderSource for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Expands `{...}` placeholders in configuration strings.
pub struct Replacer {
    source: Box<dyn PlaceholderSource>,
}

impl Replacer {
    /// Replacer over the process environment and host facts.
    pub fn new() -> Self {
        Self::with_source(SystemPlaceholders)
    }

    pub fn with_source(source: impl PlaceholderSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Replace every placeholder in `input`; unknown keys expand to "".
    pub fn replace_all(&self, input: &str) -> String {
        let mut output = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(idx) = rest.find(['{', '}', '\\']) {
            output.push_str(&rest[..idx]);
            let tail = &rest[idx..];

            if let Some(escaped) = tail.strip_prefix('\\') {
                match escaped.chars().next() {
                    Some(c @ ('{' | '}')) => {
                        output.push(c);
                        rest = &escaped[1..];
                    }
                    _ => {
                        output.push('\\');
                        rest = escaped;
                    }
                }
                continue;
            }

            if tail.starts_with('}') {
                output.push('}');
                rest = &tail[1..];
                continue;
            }

            match tail[1..].find('}') {
                Some(end) => {
                    let key = &tail[1..1 + end];
                    if let Some(value) = self.source.lookup(key) {
                        output.push_str(&value);
                    }
                    rest = &tail[end + 2..];
                }
                None => {
                    output.push_str(tail);
                    rest = "";
                }
            }
        }

        output.push_str(rest);
        output
    }
}

impl Default for Replacer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Replacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replacer").finish_non_exhaustive()
    }
}
