//! Body serialization formats.

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::RenderError;

/// A serialization format with a registered encoder.
///
/// The format of a media type is its `+suffix` (`application/vnd.acme+json`)
/// or, without a suffix, its subtype (`application/yaml`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Yaml,
    Xml,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown serialization format {0:?}, expected json, yaml or xml")]
pub struct UnknownFormat(pub String);

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Xml => "xml",
        }
    }

    /// Maps a media-type format token to an encoder, `None` when unsupported.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "json" => Some(Self::Json),
            "yaml" => Some(Self::Yaml),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }

    /// Serializes `payload`.
    ///
    /// JSON output ends with a newline and has `<`, `>` and `&` escaped as
    /// `\u003c`, `\u003e` and `\u0026`. XML uses the payload's type name as
    /// the root element, so maps and bare sequences cannot be encoded as XML.
    pub fn encode<T>(self, payload: &T) -> Result<Vec<u8>, RenderError>
    where
        T: Serialize + ?Sized,
    {
        let failed = |message: String| RenderError::Serialize {
            format: self,
            message,
        };

        match self {
            Self::Json => {
                let mut body = Vec::with_capacity(128);
                let mut serializer = serde_json::Serializer::with_formatter(&mut body, HtmlSafe);
                payload
                    .serialize(&mut serializer)
                    .map_err(|e| failed(e.to_string()))?;
                body.push(b'\n');
                Ok(body)
            }
            Self::Yaml => serde_yaml::to_string(payload)
                .map(String::into_bytes)
                .map_err(|e| failed(e.to_string())),
            Self::Xml => quick_xml::se::to_string(payload)
                .map(String::into_bytes)
                .map_err(|e| failed(e.to_string())),
        }
    }
}

/// Compact JSON with HTML-sensitive characters escaped inside strings.
struct HtmlSafe;

impl serde_json::ser::Formatter for HtmlSafe {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            let escaped = match c {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(fragment[start..i].as_bytes())?;
            writer.write_all(escaped.as_bytes())?;
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(&s.trim().to_ascii_lowercase()).ok_or_else(|| UnknownFormat(s.to_owned()))
    }
}
