//! Step value patterns: exact values or a single `*` wildcard

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const WILDCARD: char = '*';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("'{value}' contains {count} wildcards; at most one '*' is allowed")]
    TooManyWildcards { value: String, count: usize },
}

/// A compiled step value. `Wildcard` matches any candidate that starts with
/// `prefix` and ends with `suffix` (the `*` may match the empty string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValuePattern {
    Exact(String),
    Wildcard { prefix: String, suffix: String },
}

impl ValuePattern {
    pub fn parse(value: &str) -> Result<Self, PatternError> {
        let count = value.matches(WILDCARD).count();
        match count {
            0 => Ok(ValuePattern::Exact(value.to_string())),
            1 => {
                let (prefix, suffix) = value.split_once(WILDCARD).unwrap_or((value, ""));
                Ok(ValuePattern::Wildcard {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                })
            }
            count => Err(PatternError::TooManyWildcards {
                value: value.to_string(),
                count,
            }),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            ValuePattern::Exact(value) => value == candidate,
            ValuePattern::Wildcard { prefix, suffix } => {
                candidate.len() >= prefix.len() + suffix.len()
                    && candidate.starts_with(prefix.as_str())
                    && candidate.ends_with(suffix.as_str())
            }
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, ValuePattern::Wildcard { .. })
    }

    /// `LIKE` operand for the wildcard form, with `\`, `%` and `_` escaped.
    pub fn like_pattern(&self) -> Option<String> {
        match self {
            ValuePattern::Exact(_) => None,
            ValuePattern::Wildcard { prefix, suffix } => {
                Some(format!("{}%{}", escape_like(prefix), escape_like(suffix)))
            }
        }
    }
}

impl fmt::Display for ValuePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuePattern::Exact(value) => write!(f, "{value}"),
            ValuePattern::Wildcard { prefix, suffix } => write!(f, "{prefix}{WILDCARD}{suffix}"),
        }
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern() {
        let pattern = ValuePattern::parse("/pricing").unwrap();
        assert!(pattern.matches("/pricing"));
        assert!(!pattern.matches("/pricing/enterprise"));
        assert!(pattern.like_pattern().is_none());
    }

    #[test]
    fn test_wildcard_matches_prefix_and_suffix() {
        let pattern = ValuePattern::parse("/blog/*").unwrap();
        assert!(pattern.matches("/blog/rust"));
        assert!(pattern.matches("/blog/"));
        assert!(!pattern.matches("/blog"));
        assert!(!pattern.matches("/docs/rust"));

        let middle = ValuePattern::parse("/shop/*/cart").unwrap();
        assert!(middle.matches("/shop/eu/cart"));
        assert!(!middle.matches("/shop/cart"));
    }

    #[test]
    fn test_wildcard_prefix_and_suffix_do_not_overlap() {
        let pattern = ValuePattern::parse("ab*ba").unwrap();
        assert!(!pattern.matches("aba"));
        assert!(pattern.matches("abba"));
    }

    #[test]
    fn test_more_than_one_wildcard_is_rejected() {
        let err = ValuePattern::parse("/a/*/b/*").unwrap_err();
        assert_eq!(
            err,
            PatternError::TooManyWildcards {
                value: "/a/*/b/*".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        let pattern = ValuePattern::parse("/100%_off/*").unwrap();
        assert_eq!(pattern.like_pattern().unwrap(), "/100\\%\\_off/%");
        assert_eq!(pattern.to_string(), "/100%_off/*");
    }
}
