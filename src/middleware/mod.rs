//! Middleware pipeline: composable before/after logic around the router.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] and [`endpoint`]: build handlers from a [`Middleware`]
//!   or from the [`Router`] that terminates the chain.
//! - [`Pipeline`]: middleware stack plus router, the entry point for requests.
//!
//! Built-in layers are [`RequestLogger`] and [`CompressionMiddleware`].

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::time::Instant;

use crate::config::{LoggingSettings, Settings};
use crate::context::Context;
use crate::http::{Request, Response, StatusCode, header};
use crate::render::Renderer;
use crate::router::Router;

mod compression;

pub use compression::{CompressionError, CompressionMiddleware};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`] implementation.
/// Calling [`Next::run`] advances the cursor by one position and invokes the next
/// middleware (or returns a fallback `500` response when the chain is exhausted
/// without any middleware generating a response).
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation.
///
/// # Examples
///
/// ```
/// use std::pin::Pin;
/// use conneg::{http::Response, context::Context, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`;
/// the [`Arc`] lets [`Next`] advance through the chain without copying
/// closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// ```
/// use std::sync::Arc;
/// use conneg::middleware::{RequestLogger, from_middleware};
///
/// let handler = from_middleware(Arc::new(RequestLogger::new()));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// The terminal handler: dispatches to `router` and ignores `next`.
pub fn endpoint(router: Arc<Router>) -> MiddlewareHandler {
    Arc::new(move |ctx: Context, _next: Next| {
        let router = Arc::clone(&router);
        Box::pin(async move { router.dispatch(ctx).await })
    })
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// If no handler remains, a `500 Internal Server Error` is returned.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            tracing::error!(
                path = ctx.request().path(),
                "middleware chain exhausted without a response"
            );
            Response::new(StatusCode::InternalServerError)
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may pass
/// through, short-circuit by returning a [`Response`] without calling `next`,
/// or decorate the downstream response.
///
/// Implementations are shared across Tokio tasks, hence `Send + Sync`, and
/// must return a `Send` future.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Logs one `info` record per request once the response is known: method,
/// path, status, elapsed time and the negotiated `Content-Type` and
/// `Content-Encoding`.
///
/// Paths listed as excluded (health probes, typically) are not logged.
///
/// ```
/// use conneg::middleware::RequestLogger;
///
/// let logger = RequestLogger::new().exclude(["/healthy", "/ready"]);
/// assert!(logger.is_excluded("/healthy"));
/// assert!(!logger.is_excluded("/books"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestLogger {
    excluded_paths: HashSet<String>,
}

impl RequestLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self::new().exclude(settings.excluded_paths.iter().cloned())
    }

    #[must_use]
    pub fn exclude<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.contains(path)
    }
}

impl Middleware for RequestLogger {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let excluded = self.is_excluded(ctx.request().path());

        Box::pin(async move {
            if excluded {
                return next.run(ctx).await;
            }

            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            let headers = response.headers();
            tracing::info!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                content_type = headers.get(header::CONTENT_TYPE).unwrap_or(""),
                content_encoding = headers.get(header::CONTENT_ENCODING).unwrap_or(""),
                "request completed"
            );

            response
        })
    }
}

/// A router wrapped in its middleware stack.
///
/// Middleware runs in the order it was added; the router always runs last.
///
/// # Examples
///
/// ```
/// use conneg::context::Context;
/// use conneg::http::{Method, Request, StatusCode};
/// use conneg::middleware::{CompressionMiddleware, Pipeline, RequestLogger};
/// use conneg::router::Router;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut router = Router::new();
/// router
///     .get(|ctx: Context| async move { ctx.render(StatusCode::Ok, &["dune", "emma"]) })
///     .produce(["application/json"])
///     .set_default()
///     .register()
///     .unwrap();
///
/// let pipeline = Pipeline::new(router)
///     .with(RequestLogger::new())
///     .with(CompressionMiddleware::new());
///
/// let request = Request::new(Method::Get, "/books").with_header("Accept", "*/*");
/// let response = pipeline.handle(request).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.body_ref(), b"[\"dune\",\"emma\"]\n");
/// # }
/// ```
pub struct Pipeline {
    middlewares: Vec<MiddlewareHandler>,
    router: Arc<Router>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        Self {
            middlewares: Vec::new(),
            router: Arc::new(router),
        }
    }

    /// Request logging, then compression, then `router` with a renderer
    /// configured from `settings`.
    pub fn from_settings(router: Router, settings: &Settings) -> Self {
        let router = router.with_renderer(Renderer::from_settings(&settings.render));
        Self::new(router)
            .with(RequestLogger::from_settings(&settings.logging))
            .with(CompressionMiddleware::from_settings(&settings.compression))
    }

    /// Append a middleware. It runs after every middleware added before it.
    #[must_use]
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middlewares.push(from_middleware(Arc::new(middleware)));
        self
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Run `request` through the middleware stack and the router.
    pub async fn handle(&self, request: Request) -> Response {
        let ctx = Context::new(request, Arc::clone(self.router.renderer()));
        let mut chain = self.middlewares.clone();
        chain.push(endpoint(Arc::clone(&self.router)));
        Next::new(chain).run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(
            &self,
            ctx: Context,
            next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let tag = self.0;
            Box::pin(async move {
                let mut response = next.run(ctx).await;
                response.add_header("X-Trace", tag);
                response
            })
        }
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn handle(
            &self,
            _ctx: Context,
            _next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(async { Response::new(StatusCode::Forbidden) })
        }
    }

    fn router() -> Router {
        let mut router = Router::new();
        router
            .get(|_ctx| async { Response::new(StatusCode::Ok) })
            .produce(["application/json"])
            .set_default()
            .register()
            .unwrap();
        router
    }

    fn get(path: &str) -> Request {
        Request::new(Method::Get, path).with_header("Accept", "*/*")
    }

    fn context() -> Context {
        Context::new(get("/"), Arc::new(Renderer::default()))
    }

    #[tokio::test]
    async fn empty_chain_is_a_500() {
        let res = Next::new(Vec::new()).run(context()).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn endpoint_dispatches_to_router() {
        let res = Next::new(vec![endpoint(Arc::new(router()))]).run(context()).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn middleware_runs_in_order() {
        let pipeline = Pipeline::new(router()).with(Tag("outer")).with(Tag("inner"));
        let res = pipeline.handle(get("/")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        // The inner layer decorates the response first.
        let tags: Vec<&str> = res.headers().get_all("X-Trace").collect();
        assert_eq!(tags, ["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_router() {
        let pipeline = Pipeline::new(router()).with(ShortCircuit).with(Tag("never"));
        let res = pipeline.handle(get("/")).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
        assert!(!res.headers().contains("X-Trace"));
    }

    #[tokio::test]
    async fn logger_passes_responses_through() {
        let pipeline = Pipeline::new(router())
            .with(RequestLogger::new().exclude(["/healthy"]));
        let res = pipeline.handle(get("/healthy")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        let res = pipeline
            .handle(Request::new(Method::Post, "/books"))
            .await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    }

    #[test]
    fn logger_from_settings() {
        let settings = LoggingSettings {
            excluded_paths: vec!["/healthy".into()],
        };
        let logger = RequestLogger::from_settings(&settings);
        assert!(logger.is_excluded("/healthy"));
        assert!(!logger.is_excluded("/healthy/"));
    }

    #[tokio::test]
    async fn settings_configure_the_renderer() {
        let settings = Settings::from_yaml_str("render:\n  default_format: yaml\n").unwrap();
        let mut router = Router::new();
        router
            .get(|ctx: Context| async move { ctx.render(StatusCode::Ok, &["dune"]) })
            .produce(["application/vnd.acme.books+*"])
            .set_default()
            .register()
            .unwrap();

        let pipeline = Pipeline::from_settings(router, &settings);
        let res = pipeline.handle(get("/")).await;
        assert_eq!(
            res.headers().get("Content-Type"),
            Some("application/vnd.acme.books+yaml")
        );
        assert_eq!(res.body_ref(), b"- dune\n");
    }
}
