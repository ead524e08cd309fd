//! Glob patterns used by key scanning
//!
//! Patterns follow Redis `MATCH` syntax: `*`, `?`, `[...]` and `\` to
//! escape the next character.

use regex::Regex;

use crate::domain::DomainError;

/// Escapes glob metacharacters so `literal` only matches itself
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());

    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

/// Glob matching every key that contains `needle`
pub fn contains_glob(needle: &str) -> String {
    format!("*{}*", escape_glob(needle))
}

/// Compiles a glob into an anchored regex
pub fn glob_to_regex(pattern: &str) -> Result<Regex, DomainError> {
    let mut expr = String::with_capacity(pattern.len() + 12);
    // Redis globs match across newlines
    expr.push_str("(?s)^");

    let mut chars = pattern.chars();
    let mut in_class = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(next) => expr.push_str(&regex::escape(&next.to_string())),
                None => expr.push_str(r"\\"),
            },
            '*' if !in_class => expr.push_str(".*"),
            '?' if !in_class => expr.push('.'),
            '[' if !in_class => {
                in_class = true;
                expr.push('[');
            }
            ']' if in_class => {
                in_class = false;
                expr.push(']');
            }
            '^' if in_class => expr.push('^'),
            '-' if in_class => expr.push('-'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }

    if in_class {
        return Err(DomainError::validation(format!(
            "Unterminated character class in pattern '{}'",
            pattern
        )));
    }

    expr.push('$');

    Regex::new(&expr)
        .map_err(|e| DomainError::validation(format!("Invalid pattern '{}': {}", pattern, e)))
}
