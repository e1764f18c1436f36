//! Validated key and key pattern types.

use super::{matcher, DOUBLE_WILD, SINGLE_WILD};
use crate::error::{Result, SessionError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Characters reserved for future selector syntax.
const RESERVED_CHARS: [char; 3] = ['?', '#', '$'];

/// A concrete key: `/`-separated, non-empty segments, no wildcards.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Arc<str>);

impl Key {
    /// Parse and validate a key.
    pub fn new(expr: &str) -> Result<Self> {
        check_segments(expr, false).map_err(|reason| SessionError::invalid_key(expr, reason))?;
        Ok(Key(Arc::from(expr)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Append `suffix` as further segments.
    pub fn join(&self, suffix: &str) -> Result<Key> {
        Key::new(&format!("{}/{}", self.0, suffix))
    }

    /// Append `suffix` to the last segment.
    pub fn concat(&self, suffix: &str) -> Result<Key> {
        Key::new(&format!("{}{}", self.0, suffix))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Key {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Key::new(s)
    }
}

impl TryFrom<&str> for Key {
    type Error = SessionError;

    fn try_from(s: &str) -> Result<Self> {
        Key::new(s)
    }
}

impl TryFrom<String> for Key {
    type Error = SessionError;

    fn try_from(s: String) -> Result<Self> {
        Key::new(&s)
    }
}

/// A key expression that may contain `*` and `**` segments.
///
/// Stored in canonical form: within each run of wildcard segments, all `*`
/// come first followed by at most one `**`. `a/**/*/**` becomes `a/*/**`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern(Arc<str>);

impl KeyPattern {
    /// Parse, validate and canonicalize a pattern.
    pub fn new(expr: &str) -> Result<Self> {
        check_segments(expr, true).map_err(|reason| SessionError::invalid_pattern(expr, reason))?;
        let canonical = canonicalize(expr.split('/')).join("/");
        Ok(KeyPattern(Arc::from(canonical)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Whether the pattern contains any wildcard segment.
    pub fn is_wild(&self) -> bool {
        self.segments()
            .any(|s| s == SINGLE_WILD || s == DOUBLE_WILD)
    }

    pub fn matches(&self, key: &Key) -> bool {
        matcher::matches(self, key)
    }

    pub fn intersects(&self, other: &KeyPattern) -> bool {
        matcher::intersects(self, other)
    }

    pub fn includes(&self, other: &KeyPattern) -> bool {
        matcher::includes(self, other)
    }

    /// Append `suffix` as further segments.
    pub fn join(&self, suffix: &str) -> Result<KeyPattern> {
        KeyPattern::new(&format!("{}/{}", self.0, suffix))
    }

    /// Plain string concatenation.
    ///
    /// Refused when both sides meet on a `*`, since that would silently turn
    /// two wildcards into a `**`.
    pub fn concat(&self, suffix: &str) -> Result<KeyPattern> {
        let joined = format!("{}{}", self.0, suffix);
        if self.0.ends_with('*') && suffix.starts_with('*') {
            return Err(SessionError::invalid_pattern(
                &joined,
                "concatenation would merge two wildcards",
            ));
        }
        KeyPattern::new(&joined)
    }
}

impl From<Key> for KeyPattern {
    fn from(key: Key) -> Self {
        KeyPattern(key.0)
    }
}

impl From<&Key> for KeyPattern {
    fn from(key: &Key) -> Self {
        KeyPattern(Arc::clone(&key.0))
    }
}

impl fmt::Debug for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPattern({})", self.0)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for KeyPattern {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for KeyPattern {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        KeyPattern::new(s)
    }
}

impl TryFrom<&str> for KeyPattern {
    type Error = SessionError;

    fn try_from(s: &str) -> Result<Self> {
        KeyPattern::new(s)
    }
}

impl TryFrom<String> for KeyPattern {
    type Error = SessionError;

    fn try_from(s: String) -> Result<Self> {
        KeyPattern::new(&s)
    }
}

/// Returns the reason the expression is malformed, if it is.
fn check_segments(expr: &str, allow_wild: bool) -> std::result::Result<(), String> {
    if expr.is_empty() {
        return Err("key expression is empty".to_string());
    }

    for (index, segment) in expr.split('/').enumerate() {
        if segment.is_empty() {
            return Err(format!("segment {} is empty", index));
        }
        if let Some(c) = segment.chars().find(|c| RESERVED_CHARS.contains(c)) {
            return Err(format!("segment '{}' contains reserved character '{}'", segment, c));
        }
        if segment.contains('*') {
            if !allow_wild {
                return Err(format!("segment '{}' contains a wildcard", segment));
            }
            if segment != SINGLE_WILD && segment != DOUBLE_WILD {
                return Err(format!(
                    "segment '{}' mixes '*' with other characters",
                    segment
                ));
            }
        }
    }

    Ok(())
}

fn canonicalize<'a>(segments: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut singles = 0usize;
    let mut double = false;

    let flush = |out: &mut Vec<&'a str>, singles: &mut usize, double: &mut bool| {
        out.extend(std::iter::repeat(SINGLE_WILD).take(*singles));
        if *double {
            out.push(DOUBLE_WILD);
        }
        *singles = 0;
        *double = false;
    };

    for segment in segments {
        match segment {
            SINGLE_WILD => singles += 1,
            DOUBLE_WILD => double = true,
            literal => {
                flush(&mut out, &mut singles, &mut double);
                out.push(literal);
            }
        }
    }
    flush(&mut out, &mut singles, &mut double);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        let key = Key::new("demo/example/put").unwrap();
        assert_eq!(key.segments().collect::<Vec<_>>(), vec!["demo", "example", "put"]);
        assert_eq!(key.to_string(), "demo/example/put");
        assert!(Key::new("single").is_ok());
        assert!(Key::new("with space/and-dash/ünïcode").is_ok());
    }

    #[test]
    fn test_invalid_keys() {
        for bad in ["", "/lead", "trail/", "a//b", "a/*/c", "a/**", "a/b?", "x#", "$y", "ex*"] {
            assert!(
                matches!(Key::new(bad), Err(SessionError::InvalidKey { .. })),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_invalid_patterns() {
        for bad in ["", "/demo/example/**", "a//b", "a/ex*", "a/***", "a/b/"] {
            assert!(
                matches!(KeyPattern::new(bad), Err(SessionError::InvalidPattern { .. })),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_canonical_form() {
        assert_eq!(KeyPattern::new("a/**/**/b").unwrap().as_str(), "a/**/b");
        assert_eq!(KeyPattern::new("a/**/*").unwrap().as_str(), "a/*/**");
        assert_eq!(KeyPattern::new("**/*/x/*/**/*").unwrap().as_str(), "*/**/x/*/*/**");
        assert_eq!(KeyPattern::new("a/*/b").unwrap().as_str(), "a/*/b");
        assert_eq!(
            KeyPattern::new("a/**/*").unwrap(),
            KeyPattern::new("a/*/**").unwrap()
        );
    }

    #[test]
    fn test_is_wild() {
        assert!(KeyPattern::new("a/*").unwrap().is_wild());
        assert!(!KeyPattern::new("a/b").unwrap().is_wild());
        let from_key: KeyPattern = Key::new("a/b").unwrap().into();
        assert!(!from_key.is_wild());
    }

    #[test]
    fn test_join_and_concat() {
        let base = KeyPattern::new("demo/example").unwrap();
        assert_eq!(base.join("**").unwrap().as_str(), "demo/example/**");
        assert!(base.join("").is_err());
        assert_eq!(base.concat("-c").unwrap().as_str(), "demo/example-c");

        let wild = KeyPattern::new("demo/*").unwrap();
        assert!(wild.concat("*").is_err());
        assert_eq!(wild.concat("/x").unwrap().as_str(), "demo/*/x");

        let key = Key::new("demo").unwrap();
        assert_eq!(key.join("example/put").unwrap().as_str(), "demo/example/put");
        assert!(key.join("*").is_err());
        assert_eq!(key.concat("2").unwrap().as_str(), "demo2");
    }
}
