//! `Accept` / `Content-Type` parsing into quality-ordered candidates.
//!
//! Grammar (RFC 7231 §5.3.2, RFC 2045 §5.1):
//!
//! ```text
//! media-range = ( "*" | "*/*" | type "/" "*" | type "/" subtype ) *( ";" name "=" value )
//! value       = token | quoted-string
//! ```
//!
//! A bare `*` is accepted as shorthand for `*/*`.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::{PriorityQueue, Prioritized, Quality};

/// Raised when a non-empty header contains no usable media range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderParseError {
    #[error("no supported content type found in {0:?}")]
    NoSupportedContentType(String),
}

/// One entry of an `Accept` or `Content-Type` header.
///
/// # Examples
///
/// ```
/// use conneg::negotiation::MediaTypeCandidate;
///
/// let c = MediaTypeCandidate::parse("application/vnd.acme.book+json; v=2; q=0.5").unwrap();
/// assert_eq!(c.fully_qualified_type(), "application/vnd.acme.book+json; v=2");
/// assert_eq!(c.media_type(), "application/vnd.acme.book+json");
/// assert_eq!(c.format(), "json");
/// assert_eq!(c.quality().millis(), 500);
/// assert!(c.quality_explicit());
/// assert!(!c.is_wildcard());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTypeCandidate {
    fully_qualified_type: String,
    media_type: String,
    format: String,
    quality: Quality,
    quality_explicit: bool,
    is_wildcard: bool,
}

impl MediaTypeCandidate {
    /// Parses a single comma-free header segment.
    ///
    /// Returns `None` for anything that is not a well-formed media range, for a
    /// `q` outside `[0, 1]`, and for subtypes with more than one `+`.
    pub fn parse(segment: &str) -> Option<Self> {
        let MediaRange {
            media_type,
            mut params,
        } = MediaRange::parse(segment)?;

        let (quality, quality_explicit) = match params.remove("q") {
            Some(raw) => (raw.parse::<Quality>().ok()?, true),
            None => (Quality::MAX, false),
        };
        params.remove("charset");

        let format = derive_format(&media_type)?;
        let is_wildcard = media_type == "*" || media_type == "*/*";
        let fully_qualified_type = format_media_type(&media_type, &params);

        Some(Self {
            fully_qualified_type,
            media_type,
            format,
            quality,
            quality_explicit,
            is_wildcard,
        })
    }

    /// Canonical `type/subtype; params` without `q` and `charset`.
    ///
    /// This is the key used for route matching and the literal value written
    /// back out as a resolved `Accept` or `Content-Type`.
    pub fn fully_qualified_type(&self) -> &str {
        &self.fully_qualified_type
    }

    /// `type/subtype`, lowercased.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Serialization format: the `+suffix` of the subtype, else the subtype.
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn quality_explicit(&self) -> bool {
        self.quality_explicit
    }

    /// `true` for `*` and `*/*`.
    pub fn is_wildcard(&self) -> bool {
        self.is_wildcard
    }
}

impl Prioritized for MediaTypeCandidate {
    fn quality(&self) -> Quality {
        self.quality
    }

    fn quality_explicit(&self) -> bool {
        self.quality_explicit
    }
}

impl fmt::Display for MediaTypeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fully_qualified_type)
    }
}

/// The single `Accept` value the router settled on for a request.
///
/// Handed to the handler through its context and re-parsed by the renderer.
/// It is either a candidate's fully qualified type, a route's first declared
/// produce type (possibly still containing a `+*` placeholder), or, when the
/// router had nothing better, the request's own `Accept` header verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResolvedMediaType(String);

impl ResolvedMediaType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ResolvedMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResolvedMediaType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parses a raw header value into a priority queue of candidates.
///
/// An empty header yields an empty queue. Malformed segments are skipped; if
/// every segment of a non-empty header is malformed the header is rejected.
///
/// # Errors
///
/// [`HeaderParseError::NoSupportedContentType`] when nothing in a non-empty
/// header could be parsed.
///
/// # Examples
///
/// ```
/// use conneg::negotiation::parse_media_types;
///
/// let mut queue = parse_media_types("application/xml;q=0.8, application/json").unwrap();
/// assert_eq!(queue.pop().unwrap().format(), "json");
/// assert_eq!(queue.pop().unwrap().format(), "xml");
///
/// assert!(parse_media_types("").unwrap().is_empty());
/// assert!(parse_media_types("application/a++b").is_err());
/// ```
pub fn parse_media_types(
    header: &str,
) -> Result<PriorityQueue<MediaTypeCandidate>, HeaderParseError> {
    if header.trim().is_empty() {
        return Ok(PriorityQueue::new());
    }

    let queue: PriorityQueue<_> = header
        .split(',')
        .filter_map(MediaTypeCandidate::parse)
        .collect();

    if queue.is_empty() {
        return Err(HeaderParseError::NoSupportedContentType(header.to_owned()));
    }
    Ok(queue)
}

/// Canonicalises a declared media type the same way candidates are, minus
/// the quality bookkeeping. Returns `None` when the declaration is malformed.
pub(crate) fn canonicalize(declared: &str) -> Option<String> {
    let MediaRange {
        media_type,
        mut params,
    } = MediaRange::parse(declared)?;
    params.remove("q");
    params.remove("charset");
    Some(format_media_type(&media_type, &params))
}

// Lowercased media type plus its parameters, names lowercased and sorted.
struct MediaRange {
    media_type: String,
    params: BTreeMap<String, String>,
}

impl MediaRange {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (head, rest) = match input.find(';') {
            Some(pos) => (input[..pos].trim_end(), &input[pos..]),
            None => (input, ""),
        };

        let media_type = match head.split_once('/') {
            Some((ty, subtype)) if is_token(ty) && is_token(subtype) => {
                format!(
                    "{}/{}",
                    ty.to_ascii_lowercase(),
                    subtype.to_ascii_lowercase()
                )
            }
            None if head == "*" => head.to_owned(),
            _ => return None,
        };

        Some(Self {
            media_type,
            params: parse_params(rest)?,
        })
    }
}

fn parse_params(mut rest: &str) -> Option<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Some(params);
        }

        let after_semicolon = rest.strip_prefix(';')?.trim_start();
        // Tolerate `;;` and a trailing `;`.
        if after_semicolon.is_empty() || after_semicolon.starts_with(';') {
            rest = after_semicolon;
            continue;
        }

        let name_end = after_semicolon
            .find(|c: char| !is_token_char(c))
            .unwrap_or(after_semicolon.len());
        let (name, after_name) = after_semicolon.split_at(name_end);
        if name.is_empty() {
            return None;
        }

        let after_eq = after_name.trim_start().strip_prefix('=')?.trim_start();
        let (value, remainder) = consume_value(after_eq)?;

        if params.insert(name.to_ascii_lowercase(), value).is_some() {
            return None;
        }
        rest = remainder;
    }
}

// Reads a token or a quoted-string, returning the unescaped value and the rest.
fn consume_value(input: &str) -> Option<(String, &str)> {
    let Some(quoted) = input.strip_prefix('"') else {
        let end = input
            .find(|c: char| !is_token_char(c))
            .unwrap_or(input.len());
        if end == 0 {
            return None;
        }
        return Some((input[..end].to_owned(), &input[end..]));
    };

    let mut value = String::new();
    let mut chars = quoted.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Some((value, &quoted[idx + 1..])),
            '\\' => value.push(chars.next()?.1),
            c => value.push(c),
        }
    }
    None
}

fn derive_format(media_type: &str) -> Option<String> {
    let Some((_, subtype)) = media_type.split_once('/') else {
        return Some("*".to_owned());
    };

    let mut parts = subtype.split('+');
    let _base = parts.next();
    match (parts.next(), parts.next()) {
        (None, _) => Some(subtype.to_owned()),
        (Some(suffix), None) => Some(suffix.to_owned()),
        (Some(_), Some(_)) => None,
    }
}

fn format_media_type(media_type: &str, params: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(media_type.len() + params.len() * 8);
    out.push_str(media_type);
    for (name, value) in params {
        out.push_str("; ");
        out.push_str(name);
        out.push('=');
        if is_token(value) {
            out.push_str(value);
        } else {
            out.push('"');
            for c in value.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
    }
    out
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_token_char)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?=".contains(c)
}
