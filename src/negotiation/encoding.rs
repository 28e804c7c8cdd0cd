//! `Accept-Encoding` negotiation and the streaming compressors it selects.

use std::fmt;
use std::io::{self, Write};

use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder};

use super::{PriorityQueue, Prioritized, Quality};

/// A content coding this crate can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncoding {
    Gzip,
    /// Raw DEFLATE stream (RFC 1951), no zlib wrapper.
    Deflate,
}

impl ContentEncoding {
    /// The `Content-Encoding` header value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }

    // `*` accepts anything, we answer with gzip.
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "gzip" | "*" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            _ => None,
        }
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `token[;q=value]` entry of an `Accept-Encoding` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingCandidate {
    token: String,
    quality: Quality,
    quality_explicit: bool,
}

impl EncodingCandidate {
    /// Parses one comma-free segment. Only a `q=` parameter is interpreted;
    /// an unparsable `q` discards the segment.
    pub fn parse(segment: &str) -> Option<Self> {
        let mut parts = segment.trim().split(';');
        let token = parts.next()?.trim().to_ascii_lowercase();
        if token.is_empty() {
            return None;
        }

        let mut candidate = Self {
            token,
            quality: Quality::MAX,
            quality_explicit: false,
        };
        if let Some(raw) = parts.next().and_then(|p| p.trim().strip_prefix("q=")) {
            candidate.quality = raw.parse().ok()?;
            candidate.quality_explicit = true;
        }
        Some(candidate)
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Prioritized for EncodingCandidate {
    fn quality(&self) -> Quality {
        self.quality
    }

    fn quality_explicit(&self) -> bool {
        self.quality_explicit
    }
}

/// Picks the content coding for a response from the request's
/// `Accept-Encoding` value.
///
/// Candidates are tried in priority order and the first supported one wins;
/// `None` means identity (no `Content-Encoding` header).
///
/// # Examples
///
/// ```
/// use conneg::negotiation::{select_encoding, ContentEncoding};
///
/// assert_eq!(select_encoding("gzip;q=1.0, deflate"), Some(ContentEncoding::Gzip));
/// assert_eq!(select_encoding("deflate;q=1.0, gzip;q=0.5"), Some(ContentEncoding::Deflate));
/// assert_eq!(select_encoding("br"), None);
/// ```
pub fn select_encoding(accept_encoding: &str) -> Option<ContentEncoding> {
    accept_encoding
        .split(',')
        .filter_map(EncodingCandidate::parse)
        .collect::<PriorityQueue<_>>()
        .find_map(|candidate| ContentEncoding::from_token(candidate.token()))
}

/// [`select_encoding`] flattened to the header value: `"gzip"`, `"deflate"`
/// or `""` for identity.
pub fn select_encoding_token(accept_encoding: &str) -> &'static str {
    select_encoding(accept_encoding).map_or("", ContentEncoding::as_str)
}

/// A per-response streaming writer that compresses everything written to it.
///
/// Owned by exactly one response. Call [`finish`](Self::finish) to flush the
/// trailer; dropping an unfinished compressor still finalises the stream, but
/// any error is lost.
pub enum Compressor<W: Write> {
    Identity(W),
    Gzip(GzEncoder<W>),
    Deflate(DeflateEncoder<W>),
}

impl<W: Write> Compressor<W> {
    /// Wraps `sink` in the encoder for `encoding` (identity when `None`).
    /// `level` is clamped to `0..=9`.
    pub fn new(encoding: Option<ContentEncoding>, sink: W, level: u32) -> Self {
        let level = Compression::new(level.min(9));
        match encoding {
            None => Self::Identity(sink),
            Some(ContentEncoding::Gzip) => Self::Gzip(GzEncoder::new(sink, level)),
            Some(ContentEncoding::Deflate) => Self::Deflate(DeflateEncoder::new(sink, level)),
        }
    }

    /// Writes the stream trailer and returns the underlying sink.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Identity(mut sink) => {
                sink.flush()?;
                Ok(sink)
            }
            Self::Gzip(encoder) => encoder.finish(),
            Self::Deflate(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Identity(sink) => sink.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
            Self::Deflate(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Identity(sink) => sink.flush(),
            Self::Gzip(encoder) => encoder.flush(),
            Self::Deflate(encoder) => encoder.flush(),
        }
    }
}

/// Compresses a complete body in one go.
pub fn compress(encoding: Option<ContentEncoding>, body: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut compressor = Compressor::new(encoding, Vec::with_capacity(body.len() / 2), level);
    compressor.write_all(body)?;
    compressor.finish()
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::{DeflateDecoder, GzDecoder};

    use super::*;

    #[test]
    fn single_choice() {
        assert_eq!(select_encoding("gzip"), Some(ContentEncoding::Gzip));
        assert_eq!(select_encoding("deflate"), Some(ContentEncoding::Deflate));
    }

    #[test]
    fn any_maps_to_gzip() {
        assert_eq!(select_encoding("*"), Some(ContentEncoding::Gzip));
        assert_eq!(select_encoding_token("*"), "gzip");
    }

    #[test]
    fn unsupported_is_identity() {
        assert_eq!(select_encoding("br"), None);
        assert_eq!(select_encoding(""), None);
        assert_eq!(select_encoding_token("br, compress"), "");
    }

    #[test]
    fn highest_quality_wins() {
        assert_eq!(select_encoding_token("deflate;q=1.0, gzip;q=0.5"), "deflate");
        assert_eq!(select_encoding_token("gzip;q=0.2, br, deflate;q=0.9"), "deflate");
    }

    #[test]
    fn explicit_quality_wins_tie() {
        assert_eq!(select_encoding_token("gzip;q=1.0, deflate"), "gzip");
        assert_eq!(select_encoding_token("deflate, gzip;q=1.0"), "gzip");
    }

    #[test]
    fn unsupported_top_choice_falls_through() {
        assert_eq!(select_encoding_token("br;q=1.0, deflate;q=0.4"), "deflate");
    }

    #[test]
    fn bad_quality_drops_only_that_token() {
        assert_eq!(select_encoding_token("gzip;q=abc, deflate;q=0.1"), "deflate");
    }

    #[test]
    fn tokens_are_case_insensitive() {
        assert_eq!(select_encoding(" GZip ;q=0.5"), Some(ContentEncoding::Gzip));
    }

    #[test]
    fn gzip_stream_round_trips() {
        let compressed = compress(Some(ContentEncoding::Gzip), b"test", 6).unwrap();
        let mut out = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "test");
    }

    #[test]
    fn deflate_stream_round_trips() {
        let compressed = compress(Some(ContentEncoding::Deflate), b"test", 6).unwrap();
        let mut out = String::new();
        DeflateDecoder::new(compressed.as_slice())
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "test");
    }

    #[test]
    fn identity_passes_through() {
        assert_eq!(compress(None, b"plain", 6).unwrap(), b"plain");
    }

    #[test]
    fn streaming_writes_share_one_stream() {
        let mut compressor = Compressor::new(Some(ContentEncoding::Gzip), Vec::new(), 9);
        compressor.write_all(b"hello ").unwrap();
        compressor.write_all(b"world").unwrap();
        let compressed = compressor.finish().unwrap();

        let mut out = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "hello world");
    }
}
