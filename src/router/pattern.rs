//! Declared media-type patterns with a single `*` wildcard.

use std::fmt;

use super::RouteError;
use crate::negotiation::media_type::canonicalize;

/// A media type a route consumes or produces.
///
/// The declaration is canonicalised first (lowercased type, sorted
/// parameters, `q` and `charset` dropped), then split on its first `*`:
/// `application/vnd.foo+*; v=2` matches any value that starts with
/// `application/vnd.foo+` and ends with `; v=2`. Further `*` characters are
/// literal.
///
/// # Examples
///
/// ```
/// use conneg::router::MediaPattern;
///
/// let pattern = MediaPattern::parse("application/vnd.foo+*;v=2").unwrap();
/// assert!(pattern.matches("application/vnd.foo+json; v=2"));
/// assert!(!pattern.matches("application/vnd.foo+json; v=3"));
/// assert_eq!(pattern.fully_qualified_type(), "application/vnd.foo+*; v=2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPattern {
    prefix: String,
    suffix: String,
    has_wildcard: bool,
}

impl MediaPattern {
    /// Builds a pattern from an already canonical value without validation.
    pub fn new(literal: &str) -> Self {
        match literal.split_once('*') {
            Some((prefix, suffix)) => Self {
                prefix: prefix.to_owned(),
                suffix: suffix.to_owned(),
                has_wildcard: true,
            },
            None => Self {
                prefix: literal.to_owned(),
                suffix: String::new(),
                has_wildcard: false,
            },
        }
    }

    /// Canonicalises `declared` and builds a pattern from it.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidMediaType`] when `declared` is empty or not a
    /// media type.
    pub fn parse(declared: &str) -> Result<Self, RouteError> {
        canonicalize(declared)
            .map(|canonical| Self::new(&canonical))
            .ok_or_else(|| RouteError::InvalidMediaType(declared.to_owned()))
    }

    /// Whether a candidate's fully qualified type satisfies this pattern.
    pub fn matches(&self, value: &str) -> bool {
        if !self.has_wildcard {
            return self.prefix == value;
        }
        value.len() >= self.prefix.len() + self.suffix.len()
            && value.starts_with(&self.prefix)
            && value.ends_with(&self.suffix)
    }

    /// The declared pattern, `*` included, as advertised to clients.
    pub fn fully_qualified_type(&self) -> String {
        let star = if self.has_wildcard { "*" } else { "" };
        format!("{}{star}{}", self.prefix, self.suffix)
    }

    pub fn has_wildcard(&self) -> bool {
        self.has_wildcard
    }
}

impl fmt::Display for MediaPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fully_qualified_type())
    }
}
