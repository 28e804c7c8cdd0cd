//! Response rendering driven by the resolved `Accept` value.
//!
//! The router settles on one media type per request and hands it to the
//! handler as a [`ResolvedMediaType`]. [`Renderer::render`] re-parses that
//! value, picks the encoder for its format and fills in any `+*` placeholder,
//! so a route declared as `application/vnd.acme.book+*; v=2` answers with
//! `application/vnd.acme.book+json; v=2` (or `+yaml`, `+xml`).
//!
//! Handlers normally go through the helpers at the bottom of this module,
//! which turn a render failure into a `500` response.

use serde::Serialize;
use thiserror::Error;

use crate::config::RenderSettings;
use crate::context::Context;
use crate::http::{Response, StatusCode, header};
use crate::negotiation::{
    HeaderParseError, MediaTypeCandidate, ResolvedMediaType, parse_media_types,
};

mod format;

pub use format::{Format, UnknownFormat};

/// Errors surfaced while turning a payload into a response body.
///
/// All of them map to `500 Internal Server Error` upstream.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid Accept value {accept:?}: {source}")]
    InvalidAccept {
        accept: String,
        #[source]
        source: HeaderParseError,
    },

    #[error("no serializer registered for Accept value {0:?}")]
    SerializerMissing(String),

    #[error("Accept value {0:?} needs a default format but none is configured")]
    NoDefaultFormat(String),

    #[error("failed to serialize {format} body: {message}")]
    Serialize { format: Format, message: String },
}

/// A serialized body and the `Content-Type` it must be sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content_type: String,
    pub format: Format,
    pub body: Vec<u8>,
}

/// Picks a serializer from a resolved media type and encodes payloads.
///
/// # Examples
///
/// ```
/// use conneg::negotiation::ResolvedMediaType;
/// use conneg::render::Renderer;
///
/// #[derive(serde::Serialize)]
/// struct Book {
///     #[serde(rename = "nameJson")]
///     name: String,
/// }
///
/// let renderer = Renderer::default();
/// let accept = ResolvedMediaType::new("application/json");
/// let rendered = renderer.render(&accept, &Book { name: "test".into() }).unwrap();
/// assert_eq!(rendered.content_type, "application/json");
/// assert_eq!(rendered.body, b"{\"nameJson\":\"test\"}\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renderer {
    default_format: Option<Format>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            default_format: Some(Format::Json),
        }
    }
}

impl Renderer {
    /// A renderer that answers wildcards with JSON.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the format used for `*`, `*/*` and `+*` media types.
    /// `None` makes such requests fail with [`RenderError::NoDefaultFormat`].
    #[must_use]
    pub fn with_default_format(mut self, format: Option<Format>) -> Self {
        self.default_format = format;
        self
    }

    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self::new().with_default_format(settings.default_format)
    }

    pub fn default_format(&self) -> Option<Format> {
        self.default_format
    }

    /// Chooses the format and outgoing `Content-Type` for `accept`.
    ///
    /// Candidates are popped in priority order until one has a registered
    /// encoder (or a wildcard format that the default can fill).
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidAccept`], [`RenderError::SerializerMissing`] or
    /// [`RenderError::NoDefaultFormat`].
    pub fn negotiate(&self, accept: &ResolvedMediaType) -> Result<(Format, String), RenderError> {
        let queue = parse_media_types(accept.as_str()).map_err(|source| RenderError::InvalidAccept {
            accept: accept.to_string(),
            source,
        })?;

        let candidate = queue
            .into_iter()
            .find(|c| c.format() == "*" || Format::from_token(c.format()).is_some())
            .ok_or_else(|| RenderError::SerializerMissing(accept.to_string()))?;

        self.select(&candidate, accept)
    }

    fn select(
        &self,
        candidate: &MediaTypeCandidate,
        accept: &ResolvedMediaType,
    ) -> Result<(Format, String), RenderError> {
        let format = match Format::from_token(candidate.format()) {
            Some(format) if !candidate.is_wildcard() => format,
            _ => self
                .default_format
                .ok_or_else(|| RenderError::NoDefaultFormat(accept.to_string()))?,
        };

        let content_type = if candidate.is_wildcard() {
            format!("application/{format}")
        } else {
            candidate
                .fully_qualified_type()
                .replacen("+*", &format!("+{format}"), 1)
        };
        Ok((format, content_type))
    }

    /// Serializes `payload` according to `accept`.
    ///
    /// # Errors
    ///
    /// Any [`RenderError`]; the caller is expected to answer with a 500.
    pub fn render<T>(
        &self,
        accept: &ResolvedMediaType,
        payload: &T,
    ) -> Result<Rendered, RenderError>
    where
        T: Serialize + ?Sized,
    {
        let (format, content_type) = self.negotiate(accept)?;
        let body = format.encode(payload)?;
        Ok(Rendered {
            content_type,
            format,
            body,
        })
    }
}

/// Renders `payload` for the request behind `ctx` with the given status.
///
/// On failure the error is logged and an empty `500` is returned instead.
pub fn respond<T>(ctx: &Context, status: StatusCode, payload: &T) -> Response
where
    T: Serialize + ?Sized,
{
    let accept = ctx.resolved_media_type();
    match ctx.renderer().render(&accept, payload) {
        Ok(rendered) => Response::new(status)
            .header(header::CONTENT_TYPE, rendered.content_type)
            .body_bytes(rendered.body),
        Err(e) => {
            tracing::error!(accept = %accept, error = %e, "failed to render response");
            Response::new(StatusCode::InternalServerError)
        }
    }
}

/// `200 OK` with a rendered body.
pub fn ok<T: Serialize + ?Sized>(ctx: &Context, payload: &T) -> Response {
    respond(ctx, StatusCode::Ok, payload)
}

/// `201 Created` with a rendered body.
pub fn created<T: Serialize + ?Sized>(ctx: &Context, payload: &T) -> Response {
    respond(ctx, StatusCode::Created, payload)
}

/// `202 Accepted` with a rendered body.
pub fn accepted<T: Serialize + ?Sized>(ctx: &Context, payload: &T) -> Response {
    respond(ctx, StatusCode::Accepted, payload)
}

/// `404 Not Found` with a rendered body.
pub fn not_found<T: Serialize + ?Sized>(ctx: &Context, payload: &T) -> Response {
    respond(ctx, StatusCode::NotFound, payload)
}

/// `400 Bad Request` with a rendered body.
pub fn bad_request<T: Serialize + ?Sized>(ctx: &Context, payload: &T) -> Response {
    respond(ctx, StatusCode::BadRequest, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    #[serde(rename = "testStruct")]
    struct TestStruct {
        #[serde(rename = "NameXml")]
        name: String,
    }

    #[derive(Serialize)]
    struct JsonStruct {
        #[serde(rename = "nameJson")]
        name: String,
    }

    #[derive(Serialize)]
    struct YamlStruct {
        #[serde(rename = "nameYaml")]
        name: String,
    }

    const V1BETA1_JSON: &str = "application/vnd.acme.test+json; version=v1beta1";
    const V1BETA1_YAML: &str = "application/vnd.acme.test+yaml; version=v1beta1";
    const V1BETA1_XML: &str = "application/vnd.acme.test+xml; v=v1beta1";
    const V1BETA2: &str = "application/vnd.acme.test+xml; v=v1beta2";
    const V2: &str = "application/vnd.acme.test+yaml; v=v2";

    fn render<T: Serialize>(accept: &str, payload: &T) -> Rendered {
        Renderer::default()
            .render(&ResolvedMediaType::new(accept), payload)
            .unwrap()
    }

    fn content_type(accept: &str) -> String {
        Renderer::default()
            .negotiate(&ResolvedMediaType::new(accept))
            .unwrap()
            .1
    }

    fn json() -> JsonStruct {
        JsonStruct { name: "test".into() }
    }

    #[test]
    fn json_accept() {
        let r = render("application/json", &json());
        assert_eq!(r.content_type, "application/json");
        assert_eq!(r.body, b"{\"nameJson\":\"test\"}\n");
    }

    #[test]
    fn yaml_accept() {
        let r = render("application/yaml", &YamlStruct { name: "test".into() });
        assert_eq!(r.content_type, "application/yaml");
        assert_eq!(r.body, b"nameYaml: test\n");
    }

    #[test]
    fn xml_accept() {
        let r = render("application/xml", &TestStruct { name: "test".into() });
        assert_eq!(r.content_type, "application/xml");
        assert_eq!(r.body, b"<testStruct><NameXml>test</NameXml></testStruct>");
    }

    #[test]
    fn vendor_types_keep_their_parameters() {
        assert_eq!(content_type(V1BETA1_JSON), V1BETA1_JSON);
        assert_eq!(content_type(V1BETA1_YAML), V1BETA1_YAML);
        assert_eq!(content_type(V1BETA1_XML), V1BETA1_XML);
        assert_eq!(render(V1BETA1_JSON, &json()).body, b"{\"nameJson\":\"test\"}\n");
    }

    #[test]
    fn higher_quality_wins() {
        assert_eq!(content_type(&format!("{V1BETA1_JSON};q=0.8, {V1BETA2}")), V1BETA2);
    }

    #[test]
    fn explicit_quality_wins_tie() {
        assert_eq!(content_type(&format!("{V2};q=1.0, {V1BETA2}")), V2);
    }

    #[test]
    fn wildcard_uses_default_format() {
        let r = render("*/*", &json());
        assert_eq!(r.content_type, "application/json");
        assert_eq!(r.format, Format::Json);
        assert_eq!(content_type("*"), "application/json");
    }

    #[test]
    fn placeholder_is_substituted() {
        assert_eq!(
            content_type("application/vnd.foo+*;v=2"),
            "application/vnd.foo+json; v=2"
        );
        let yaml = Renderer::new().with_default_format(Some(Format::Yaml));
        let (format, ct) = yaml
            .negotiate(&ResolvedMediaType::new("application/vnd.foo+*; v=2"))
            .unwrap();
        assert_eq!(format, Format::Yaml);
        assert_eq!(ct, "application/vnd.foo+yaml; v=2");
    }

    #[test]
    fn unsupported_top_candidate_falls_back() {
        assert_eq!(
            content_type("text/html, application/yaml;q=0.2"),
            "application/yaml"
        );
    }

    #[test]
    fn nothing_supported_is_an_error() {
        let err = Renderer::default()
            .render(&ResolvedMediaType::new("text/html"), &json())
            .unwrap_err();
        assert!(matches!(err, RenderError::SerializerMissing(_)));

        let err = Renderer::default()
            .render(&ResolvedMediaType::new(""), &json())
            .unwrap_err();
        assert!(matches!(err, RenderError::SerializerMissing(_)));
    }

    #[test]
    fn malformed_accept_is_an_error() {
        let err = Renderer::default()
            .render(&ResolvedMediaType::new("a/b++c"), &json())
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidAccept { .. }));
    }

    #[test]
    fn wildcard_without_default_is_an_error() {
        let renderer = Renderer::new().with_default_format(None);
        let err = renderer
            .render(&ResolvedMediaType::new("*/*"), &json())
            .unwrap_err();
        assert!(matches!(err, RenderError::NoDefaultFormat(_)));
    }
}
