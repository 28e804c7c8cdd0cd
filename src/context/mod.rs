//! Per-request context: the request, the media type the router resolved for
//! it, the shared renderer and type-erased extensions.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::http::{Request, Response, StatusCode};
use crate::negotiation::{ResolvedMediaType, parse_media_types};
use crate::render::{self, Format, Renderer};

/// Type-erased request extensions map, used by middleware to hand state to
/// later layers without knowing each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Errors from [`Context::body`].
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("cannot decode request body of type {0:?}")]
    UnsupportedContentType(String),

    #[error("invalid {format} request body: {message}")]
    Decode { format: Format, message: String },
}

/// Everything a handler gets for one request.
pub struct Context {
    request: Request,
    resolved: Option<ResolvedMediaType>,
    renderer: Arc<Renderer>,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request, renderer: Arc<Renderer>) -> Self {
        Self {
            request,
            resolved: None,
            renderer,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    /// The media type the response must be rendered as.
    ///
    /// Set by the router on dispatch; before that (or for a context built by
    /// hand) it is the request's own `Accept` value.
    pub fn resolved_media_type(&self) -> ResolvedMediaType {
        match &self.resolved {
            Some(resolved) => resolved.clone(),
            None => ResolvedMediaType::new(self.request.accept()),
        }
    }

    pub fn set_resolved_media_type(&mut self, resolved: ResolvedMediaType) {
        self.resolved = Some(resolved);
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Render `payload` as the resolved media type. See [`render::respond`].
    pub fn render<T>(&self, status: StatusCode, payload: &T) -> Response
    where
        T: Serialize + ?Sized,
    {
        render::respond(self, status, payload)
    }

    /// Decode the body as JSON regardless of `Content-Type`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }

    /// Decode the body with the codec matching its `Content-Type` format
    /// (`+json`, `+yaml`, `+xml` or the bare subtypes). A missing
    /// `Content-Type` is read as JSON.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use conneg::context::Context;
    /// use conneg::http::{Method, Request};
    /// use conneg::render::Renderer;
    ///
    /// #[derive(serde::Deserialize)]
    /// struct Book {
    ///     title: String,
    /// }
    ///
    /// let request = Request::new(Method::Post, "/books")
    ///     .with_header("Content-Type", "application/vnd.acme.book+yaml; v=2")
    ///     .with_body("title: Dune\n");
    /// let ctx = Context::new(request, Arc::new(Renderer::default()));
    /// let book: Book = ctx.body().unwrap();
    /// assert_eq!(book.title, "Dune");
    /// ```
    pub fn body<T>(&self) -> Result<T, BodyError>
    where
        T: DeserializeOwned,
    {
        let content_type = self.request.content_type();
        let format = if content_type.trim().is_empty() {
            Format::Json
        } else {
            parse_media_types(content_type)
                .ok()
                .and_then(|mut queue| queue.pop())
                .and_then(|candidate| Format::from_token(candidate.format()))
                .ok_or_else(|| BodyError::UnsupportedContentType(content_type.to_owned()))?
        };

        let body = self.request.body();
        let decode_failed = |message: String| BodyError::Decode { format, message };
        match format {
            Format::Json => serde_json::from_slice(body).map_err(|e| decode_failed(e.to_string())),
            Format::Yaml => serde_yaml::from_slice(body).map_err(|e| decode_failed(e.to_string())),
            Format::Xml => {
                let text = std::str::from_utf8(body).map_err(|e| decode_failed(e.to_string()))?;
                quick_xml::de::from_str(text).map_err(|e| decode_failed(e.to_string()))
            }
        }
    }
}
