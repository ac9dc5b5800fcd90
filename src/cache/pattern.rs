// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Glob patterns for bulk cache invalidation.
//!
//! A pattern is split once into literal and wildcard tokens. Matching walks
//! the key left to right: the first literal is anchored at the start, the
//! last at the end, and every literal in between is located with a plain
//! substring search. `*` matches any run of characters, including none.
//! No regex is ever built from the pattern, so there is no pathological case.
//!
//! ```
//! use read_layer::cache::GlobPattern;
//!
//! let pattern = GlobPattern::compile("company_123_*");
//! assert!(pattern.matches("company_123_payments"));
//! assert!(!pattern.matches("company_1234_payments"));
//! assert!(!pattern.matches("stats_company_123_x"));
//! ```

/// One token of a compiled pattern
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Wildcard,
}

/// A compiled `*`-only glob pattern. Matches the whole key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    tokens: Vec<Token>,
}

impl GlobPattern {
    /// Tokenize a pattern. Adjacent wildcards collapse into one.
    pub fn compile(pattern: &str) -> Self {
        let mut tokens = Vec::new();
        let mut literal = String::new();

        for ch in pattern.chars() {
            if ch == '*' {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                if tokens.last() != Some(&Token::Wildcard) {
                    tokens.push(Token::Wildcard);
                }
            } else {
                literal.push(ch);
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Self { tokens }
    }

    /// True if the pattern has no wildcard at all.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        !self.tokens.contains(&Token::Wildcard)
    }

    /// Check a key against the pattern.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        let mut remaining = key;
        let last = self.tokens.len().saturating_sub(1);

        for (i, token) in self.tokens.iter().enumerate() {
            let Token::Literal(segment) = token else {
                continue;
            };
            let after_wildcard = i > 0 && self.tokens[i - 1] == Token::Wildcard;

            if i == last {
                // Trailing literal: anchored at the end
                return if after_wildcard {
                    remaining.ends_with(segment.as_str())
                } else {
                    remaining == segment
                };
            }

            if after_wildcard {
                // Leftmost occurrence leaves the most room for later segments
                match remaining.find(segment.as_str()) {
                    Some(pos) => remaining = &remaining[pos + segment.len()..],
                    None => return false,
                }
            } else {
                // Leading literal: anchored at the start
                match remaining.strip_prefix(segment.as_str()) {
                    Some(rest) => remaining = rest,
                    None => return false,
                }
            }
        }

        // Pattern ended on a wildcard (anything left is absorbed) or was empty
        self.tokens.last() == Some(&Token::Wildcard) || remaining.is_empty()
    }
}

/// Convenience wrapper for one-off checks.
#[must_use]
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    GlobPattern::compile(pattern).matches(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(pattern_matches("company_123", "company_123"));
        assert!(!pattern_matches("company_123", "company_1234"));
        assert!(!pattern_matches("company_123", "x_company_123"));
        assert!(GlobPattern::compile("company_123").is_exact());
    }

    #[test]
    fn test_trailing_wildcard() {
        assert!(pattern_matches("company_123_*", "company_123_payments"));
        assert!(pattern_matches("company_123_*", "company_123_"));
        assert!(!pattern_matches("company_123_*", "company_456_payments"));
        assert!(!GlobPattern::compile("company_123_*").is_exact());
    }

    #[test]
    fn test_leading_wildcard() {
        assert!(pattern_matches("*:2025", "stats:company_1:2025"));
        assert!(!pattern_matches("*:2025", "stats:company_1:2026"));
    }

    #[test]
    fn test_middle_wildcard() {
        assert!(pattern_matches("stats:*:2025", "stats:company_1:2025"));
        assert!(!pattern_matches("stats:*:2025", "stats:company_1:2025:extra"));
        assert!(!pattern_matches("stats:*:2025", "batch:company_1:2025"));
    }

    #[test]
    fn test_repeated_segment() {
        // The last literal must sit at the very end, even if it also occurs earlier
        assert!(pattern_matches("a*a", "aba"));
        assert!(pattern_matches("a*a", "aa"));
        assert!(!pattern_matches("a*a", "a"));
        assert!(pattern_matches("*ab*ab", "xabyab"));
        assert!(!pattern_matches("*ab*ab", "xaby"));
    }

    #[test]
    fn test_wildcard_only() {
        assert!(pattern_matches("*", ""));
        assert!(pattern_matches("*", "anything:at:all"));
        assert!(pattern_matches("**", "anything"));
    }

    #[test]
    fn test_adjacent_wildcards_collapse() {
        assert_eq!(GlobPattern::compile("a**b"), GlobPattern::compile("a*b"));
        assert!(pattern_matches("a**b", "a-long-middle-b"));
    }

    #[test]
    fn test_empty_pattern() {
        assert!(pattern_matches("", ""));
        assert!(!pattern_matches("", "x"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(pattern_matches("a.b*", "a.b-c"));
        assert!(!pattern_matches("a.b*", "axb-c"));
        assert!(pattern_matches("(x)+*", "(x)+y"));
    }

    #[test]
    fn test_multibyte_keys() {
        assert!(pattern_matches("empresa_ñ*", "empresa_ñandú"));
        assert!(pattern_matches("*ú", "empresa_ñandú"));
    }
}
