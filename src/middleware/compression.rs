//! Response compression negotiated from `Accept-Encoding`.

use std::future::Future;
use std::io;
use std::pin::Pin;

use thiserror::Error;

use super::{Middleware, Next};
use crate::config::CompressionSettings;
use crate::context::Context;
use crate::http::{Response, StatusCode, header};
use crate::negotiation::{ContentEncoding, compress, select_encoding};

const DEFAULT_LEVEL: u32 = 6;

#[derive(Debug, Error)]
#[error("failed to {encoding}-encode response body: {source}")]
pub struct CompressionError {
    pub encoding: ContentEncoding,
    #[source]
    pub source: io::Error,
}

/// Compresses response bodies with the best encoding the client accepts.
///
/// The encoding is chosen before the request goes downstream and stored in
/// the context's extensions as a [`ContentEncoding`], so handlers can see it.
/// Bodies are left alone when they are empty, when the client accepts no
/// supported encoding, or when a `Content-Encoding` is already set.
/// Compressed responses carry `Content-Encoding` and `Vary: Accept-Encoding`.
///
/// A compressor failure is logged and answered with an empty `500`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionMiddleware {
    enabled: bool,
    level: u32,
}

impl Default for CompressionMiddleware {
    fn default() -> Self {
        Self {
            enabled: true,
            level: DEFAULT_LEVEL,
        }
    }
}

impl CompressionMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &CompressionSettings) -> Self {
        Self {
            enabled: settings.enabled,
            level: settings.level.min(9),
        }
    }

    /// flate2 compression level, clamped to `0..=9`.
    #[must_use]
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

fn encode_body(
    response: &mut Response,
    encoding: ContentEncoding,
    level: u32,
) -> Result<(), CompressionError> {
    if response.body_ref().is_empty() || response.headers().contains(header::CONTENT_ENCODING) {
        return Ok(());
    }

    let compressed = compress(Some(encoding), response.body_ref(), level)
        .map_err(|source| CompressionError { encoding, source })?;
    response.set_body(compressed);
    response.set_header(header::CONTENT_ENCODING, encoding.as_str());
    response.add_header(header::VARY, header::ACCEPT_ENCODING);
    Ok(())
}

impl Middleware for CompressionMiddleware {
    fn handle(
        &self,
        mut ctx: Context,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let Self { enabled, level } = *self;

        Box::pin(async move {
            if !enabled {
                return next.run(ctx).await;
            }

            let Some(encoding) = select_encoding(&ctx.request().accept_encoding()) else {
                return next.run(ctx).await;
            };
            ctx.extensions_mut().insert(encoding);

            let mut response = next.run(ctx).await;
            match encode_body(&mut response, encoding, level) {
                Ok(()) => response,
                Err(e) => {
                    tracing::error!(error = %e, "response compression failed");
                    Response::new(StatusCode::InternalServerError)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::{DeflateDecoder, GzDecoder};

    use super::*;
    use crate::http::{Method, Request};
    use crate::middleware::Pipeline;
    use crate::router::Router;

    const BODY: &str = "the quick brown fox jumps over the lazy dog, again and again and again";

    fn pipeline(middleware: CompressionMiddleware) -> Pipeline {
        let mut router = Router::new();
        router
            .get(|ctx: Context| async move {
                let seen = ctx
                    .extensions()
                    .get::<ContentEncoding>()
                    .map_or("identity", |e| e.as_str());
                Response::new(StatusCode::Ok)
                    .header("X-Seen-Encoding", seen)
                    .body(BODY)
            })
            .produce(["text/plain"])
            .set_default()
            .register()
            .unwrap();
        router
            .get(|_ctx: Context| async { Response::new(StatusCode::NoContent) })
            .produce(["application/vnd.empty"])
            .register()
            .unwrap();
        router
            .get(|_ctx: Context| async {
                Response::new(StatusCode::Ok)
                    .header("Content-Encoding", "br")
                    .body("already encoded")
            })
            .produce(["application/vnd.brotli"])
            .register()
            .unwrap();
        Pipeline::new(router).with(middleware)
    }

    fn request(accept: &str, accept_encoding: &str) -> Request {
        Request::new(Method::Get, "/")
            .with_header("Accept", accept)
            .with_header("Accept-Encoding", accept_encoding)
    }

    fn gunzip(body: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(body).read_to_string(&mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn gzip_is_applied() {
        let res = pipeline(CompressionMiddleware::new())
            .handle(request("*/*", "gzip;q=1.0, deflate"))
            .await;
        assert_eq!(res.headers().get("Content-Encoding"), Some("gzip"));
        assert_eq!(res.headers().get("Vary"), Some("Accept-Encoding"));
        assert_eq!(res.headers().get("X-Seen-Encoding"), Some("gzip"));
        assert_eq!(gunzip(res.body_ref()), BODY);
    }

    #[tokio::test]
    async fn deflate_is_raw() {
        let res = pipeline(CompressionMiddleware::new())
            .handle(request("*/*", "deflate;q=1.0, gzip;q=0.5"))
            .await;
        assert_eq!(res.headers().get("Content-Encoding"), Some("deflate"));

        let mut out = String::new();
        DeflateDecoder::new(res.body_ref())
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, BODY);
    }

    #[tokio::test]
    async fn star_means_gzip() {
        let res = pipeline(CompressionMiddleware::new().level(1))
            .handle(request("*/*", "br, *;q=0.1"))
            .await;
        assert_eq!(res.headers().get("Content-Encoding"), Some("gzip"));
        assert_eq!(gunzip(res.body_ref()), BODY);
    }

    #[tokio::test]
    async fn identity_when_nothing_supported() {
        let res = pipeline(CompressionMiddleware::new())
            .handle(request("*/*", "br"))
            .await;
        assert!(!res.headers().contains("Content-Encoding"));
        assert_eq!(res.headers().get("X-Seen-Encoding"), Some("identity"));
        assert_eq!(res.body_ref(), BODY.as_bytes());
    }

    #[tokio::test]
    async fn disabled_middleware_passes_through() {
        let res = pipeline(CompressionMiddleware::new().enabled(false))
            .handle(request("*/*", "gzip"))
            .await;
        assert!(!res.headers().contains("Content-Encoding"));
        assert_eq!(res.body_ref(), BODY.as_bytes());
    }

    #[tokio::test]
    async fn empty_and_pre_encoded_bodies_are_untouched() {
        let p = pipeline(CompressionMiddleware::new());

        let res = p.handle(request("application/vnd.empty", "gzip")).await;
        assert_eq!(res.status(), StatusCode::NoContent);
        assert!(!res.headers().contains("Content-Encoding"));

        let res = p.handle(request("application/vnd.brotli", "gzip")).await;
        assert_eq!(res.headers().get("Content-Encoding"), Some("br"));
        assert_eq!(res.body_ref(), b"already encoded");
    }

    #[test]
    fn settings_clamp_level() {
        let m = CompressionMiddleware::from_settings(&CompressionSettings {
            enabled: true,
            level: 42,
        });
        assert_eq!(m, CompressionMiddleware::new().level(9));
    }
}
