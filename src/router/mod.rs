//! Media-type routing: several handlers behind one logical endpoint.
//!
//! Routes are not told apart by path but by HTTP method and by the media
//! types they consume (`Content-Type`) and produce (`Accept`). A service
//! exposing two versions of a resource registers one route per version:
//!
//! | Method | Consumes                   | Produces                   |
//! |--------|----------------------------|----------------------------|
//! | GET    |                            | `application/vnd.acme+json; v=1` |
//! | GET    |                            | `application/vnd.acme+*; v=2`    |
//! | POST   | `application/vnd.acme+json; v=2` |                      |
//!
//! [`Router::resolve`] runs the selection and returns the chosen [`RouteId`]
//! together with the [`ResolvedMediaType`] the handler must answer with, or a
//! [`DispatchError`] carrying the terminal status (405, 406 or 415).
//! [`Router::route`] wraps that in the async handler call.
//!
//! Selection order is deterministic: header candidates are tried by quality
//! (explicit `q` winning ties), routes by registration order.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::context::Context;
use crate::http::{Method, Request, Response, StatusCode, header};
use crate::negotiation::{
    HeaderParseError, MediaTypeCandidate, ResolvedMediaType, parse_media_types,
};
use crate::render::Renderer;

pub mod pattern;

pub use pattern::MediaPattern;

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be shared across
/// tasks without copying the underlying closure. You never construct this type
/// directly; pass a closure to [`Router::get`] and friends.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl
/// below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

/// Invalid route declaration. Raised at registration, never per request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("invalid media type {0:?} in route declaration")]
    InvalidMediaType(String),
}

/// Why a request could not be dispatched to any route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("malformed {header} header: {source}")]
    InvalidHeader {
        header: &'static str,
        #[source]
        source: HeaderParseError,
    },

    #[error("no route registered for method {0}")]
    NoRouteForMethod(Method),

    #[error("no route produces an acceptable media type")]
    NotAcceptable,

    #[error("unsupported media type, {header}: {supported}")]
    UnsupportedMediaType { header: String, supported: String },
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidHeader { .. } | Self::NotAcceptable => StatusCode::NotAcceptable,
            Self::NoRouteForMethod(_) => StatusCode::MethodNotAllowed,
            Self::UnsupportedMediaType { .. } => StatusCode::UnsupportedMediaType,
        }
    }

    /// The terminal response: empty body, plus the `Accept-<Method>`
    /// advertisement for 415.
    pub fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::UnsupportedMediaType { header, supported } => {
                Response::new(status).header(header, supported)
            }
            _ => Response::new(status),
        }
    }
}

/// Stable identity of a registered route: its registration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(usize);

impl RouteId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of a successful [`Router::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub route: RouteId,
    pub accept: ResolvedMediaType,
}

/// A registered route. Immutable once added to a [`Router`].
pub struct Route {
    method: Method,
    consumes: Vec<MediaPattern>,
    produces: Vec<MediaPattern>,
    is_default: bool,
    handler: Handler,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn consumes(&self) -> &[MediaPattern] {
        &self.consumes
    }

    /// Produced media types; the first one answers wildcard `Accept` values.
    pub fn produces(&self) -> &[MediaPattern] {
        &self.produces
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    fn consumes_candidate(&self, candidate: &MediaTypeCandidate) -> bool {
        self.accepts(candidate, &self.consumes)
    }

    fn produces_candidate(&self, candidate: &MediaTypeCandidate) -> bool {
        self.accepts(candidate, &self.produces)
    }

    // Wildcard candidates only reach default routes; everything else must
    // match a declared pattern.
    fn accepts(&self, candidate: &MediaTypeCandidate, patterns: &[MediaPattern]) -> bool {
        if candidate.is_wildcard() {
            return self.is_default;
        }
        let value = candidate.fully_qualified_type();
        patterns.iter().any(|p| p.matches(value))
    }

    fn fallback_media_type(&self) -> Option<String> {
        self.produces.first().map(MediaPattern::fully_qualified_type)
    }

    // Consumed types when declared, produced types otherwise.
    fn advertised(&self) -> String {
        let patterns = if self.consumes.is_empty() {
            &self.produces
        } else {
            &self.consumes
        };
        patterns
            .iter()
            .map(MediaPattern::fully_qualified_type)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

/// Fluent route declaration returned by [`Router::get`] and friends.
///
/// Nothing is added to the router until [`RouteBuilder::register`] is called.
#[must_use = "routes are only added by RouteBuilder::register"]
pub struct RouteBuilder<'r> {
    router: &'r mut Router,
    method: Method,
    handler: Handler,
    consume: Vec<String>,
    produce: Vec<String>,
    is_default: bool,
}

impl RouteBuilder<'_> {
    /// Media types accepted in the request body.
    pub fn consume<I, S>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consume.extend(media_types.into_iter().map(Into::into));
        self
    }

    /// Media types the handler can answer with. The first one is used when
    /// the client accepts anything.
    pub fn produce<I, S>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produce.extend(media_types.into_iter().map(Into::into));
        self
    }

    /// Lets wildcard `Accept` / `Content-Type` values (`*`, `*/*`) reach this route.
    pub fn set_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Validates the declared media types and adds the route.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidMediaType`] when a declared type does not parse.
    pub fn register(self) -> Result<RouteId, RouteError> {
        self.router.push_route(
            self.method,
            self.handler,
            &self.consume,
            &self.produce,
            self.is_default,
        )
    }
}

/// Media-type router.
///
/// Built once at startup, then shared read-only (usually behind an `Arc`)
/// by every request task.
///
/// # Examples
///
/// ```
/// use conneg::http::{Method, Request, Response, StatusCode};
/// use conneg::router::Router;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut router = Router::new();
/// router
///     .get(|_ctx| async { Response::new(StatusCode::Ok) })
///     .produce(["application/vnd.acme.book+json; v=1", "application/vnd.acme.book+json; v=2"])
///     .register()
///     .unwrap();
///
/// let request = Request::new(Method::Get, "/books")
///     .with_header("Accept", "application/vnd.acme.book+json; v=2");
/// assert_eq!(router.route(request).await.status(), StatusCode::Ok);
///
/// let request = Request::new(Method::Get, "/books").with_header("Accept", "text/html");
/// assert_eq!(router.route(request).await.status(), StatusCode::NotAcceptable);
/// # }
/// ```
pub struct Router {
    routes: Vec<Route>,
    renderer: Arc<Renderer>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("renderer", &self.renderer)
            .finish()
    }
}

impl Router {
    /// Create an empty router with the default JSON-fallback renderer.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            renderer: Arc::new(Renderer::default()),
        }
    }

    /// Replace the renderer handed to every handler's [`Context`].
    #[must_use]
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn renderer(&self) -> &Arc<Renderer> {
        &self.renderer
    }

    /// Register a route in one call.
    ///
    /// `consume` and `produce` are canonicalised (lowercased, parameters
    /// sorted, `q` and `charset` dropped) and may contain one `*` wildcard.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidMediaType`] when a declared type does not parse;
    /// the router is left unchanged.
    pub fn register(
        &mut self,
        method: Method,
        handler: impl IntoHandler,
        consume: &[&str],
        produce: &[&str],
        is_default: bool,
    ) -> Result<RouteId, RouteError> {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.push_route(method, handler, consume, produce, is_default)
    }

    /// Start declaring a `GET` route.
    pub fn get(&mut self, handler: impl IntoHandler) -> RouteBuilder<'_> {
        self.builder(Method::Get, handler)
    }

    /// Start declaring a `POST` route.
    pub fn post(&mut self, handler: impl IntoHandler) -> RouteBuilder<'_> {
        self.builder(Method::Post, handler)
    }

    /// Start declaring a `PUT` route.
    pub fn put(&mut self, handler: impl IntoHandler) -> RouteBuilder<'_> {
        self.builder(Method::Put, handler)
    }

    /// Start declaring a `PATCH` route.
    pub fn patch(&mut self, handler: impl IntoHandler) -> RouteBuilder<'_> {
        self.builder(Method::Patch, handler)
    }

    /// Start declaring a `DELETE` route.
    pub fn delete(&mut self, handler: impl IntoHandler) -> RouteBuilder<'_> {
        self.builder(Method::Delete, handler)
    }

    /// Start declaring a `HEAD` route.
    pub fn head(&mut self, handler: impl IntoHandler) -> RouteBuilder<'_> {
        self.builder(Method::Head, handler)
    }

    /// Start declaring an `OPTIONS` route.
    pub fn options(&mut self, handler: impl IntoHandler) -> RouteBuilder<'_> {
        self.builder(Method::Options, handler)
    }

    fn builder(&mut self, method: Method, handler: impl IntoHandler) -> RouteBuilder<'_> {
        RouteBuilder {
            router: self,
            method,
            handler: Arc::new(move |ctx| handler.call(ctx)),
            consume: Vec::new(),
            produce: Vec::new(),
            is_default: false,
        }
    }

    fn push_route<S: AsRef<str>>(
        &mut self,
        method: Method,
        handler: Handler,
        consume: &[S],
        produce: &[S],
        is_default: bool,
    ) -> Result<RouteId, RouteError> {
        let parse_all = |declared: &[S]| {
            declared
                .iter()
                .map(|d| MediaPattern::parse(d.as_ref()))
                .collect::<Result<Vec<_>, _>>()
        };
        let route = Route {
            method,
            consumes: parse_all(consume)?,
            produces: parse_all(produce)?,
            is_default,
            handler,
        };

        let id = RouteId(self.routes.len());
        tracing::debug!(
            route = %id,
            method = %route.method,
            consumes = route.consumes.len(),
            produces = route.produces.len(),
            is_default,
            "route registered"
        );
        self.routes.push(route);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn lookup(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(id.0)
    }

    /// Select the route for a request from its method and raw `Accept` /
    /// `Content-Type` values. Empty strings mean "header absent".
    ///
    /// 1. Both headers are parsed; a malformed one is a 406.
    /// 2. Routes are narrowed to the request method; none left is a 405.
    /// 3. `Content-Type` candidates are matched against consumed types. When
    ///    the client accepts anything (no `Accept`, or a wildcard on top) the
    ///    first match is dispatched right away with the route's first
    ///    produced type. Otherwise the matches are remembered.
    /// 4. A `Content-Type` no route consumes is negotiated (406 or 415).
    /// 5. `Accept` candidates are matched against produced types, restricted
    ///    to the remembered routes when a `Content-Type` was sent.
    /// 6. Nothing matched: negotiated failure.
    ///
    /// Negotiated failures are 406 except for POST and PATCH, which get a
    /// 415 advertising every same-method route's types in `Accept-<Method>`.
    ///
    /// # Errors
    ///
    /// See [`DispatchError`].
    pub fn resolve(
        &self,
        method: &Method,
        accept: &str,
        content_type: &str,
    ) -> Result<Dispatch, DispatchError> {
        let accepted = parse_media_types(accept).map_err(|source| DispatchError::InvalidHeader {
            header: header::ACCEPT,
            source,
        })?;
        let consumed =
            parse_media_types(content_type).map_err(|source| DispatchError::InvalidHeader {
                header: header::CONTENT_TYPE,
                source,
            })?;

        let candidates: Vec<(RouteId, &Route)> = self
            .routes
            .iter()
            .enumerate()
            .filter(|(_, route)| route.method.matches(method))
            .map(|(idx, route)| (RouteId(idx), route))
            .collect();
        if candidates.is_empty() {
            return Err(DispatchError::NoRouteForMethod(method.clone()));
        }

        let accepts_anything = accepted.peek().is_none_or(MediaTypeCandidate::is_wildcard);
        let mut paired: Vec<RouteId> = Vec::new();

        for candidate in consumed {
            for &(id, route) in &candidates {
                if !route.consumes_candidate(&candidate) {
                    continue;
                }
                if accepts_anything {
                    let resolved = route
                        .fallback_media_type()
                        .unwrap_or_else(|| accept.to_owned());
                    return Ok(Dispatch {
                        route: id,
                        accept: ResolvedMediaType::new(resolved),
                    });
                }
                if !paired.contains(&id) {
                    paired.push(id);
                }
            }
        }

        let has_content_type = !content_type.trim().is_empty();
        if has_content_type && paired.is_empty() {
            return Err(self.negotiation_failure(method));
        }

        for candidate in accepted {
            for &(id, route) in &candidates {
                if !route.produces_candidate(&candidate) {
                    continue;
                }
                if has_content_type && !paired.contains(&id) {
                    continue;
                }
                let resolved = match route.fallback_media_type() {
                    Some(fallback) if candidate.is_wildcard() => fallback,
                    _ => candidate.fully_qualified_type().to_owned(),
                };
                return Ok(Dispatch {
                    route: id,
                    accept: ResolvedMediaType::new(resolved),
                });
            }
        }

        Err(self.negotiation_failure(method))
    }

    fn negotiation_failure(&self, method: &Method) -> DispatchError {
        if !method.negotiates_request_body() {
            return DispatchError::NotAcceptable;
        }

        let supported = self
            .routes
            .iter()
            .filter(|route| route.method.matches(method))
            .map(Route::advertised)
            .collect::<Vec<_>>()
            .join(", ");
        DispatchError::UnsupportedMediaType {
            header: method.accept_header_name(),
            supported,
        }
    }

    /// Resolve the request behind `ctx` and run the selected handler with
    /// the resolved media type attached, or answer with the terminal
    /// 405/406/415 response.
    pub async fn dispatch(&self, mut ctx: Context) -> Response {
        let outcome = {
            let request = ctx.request();
            self.resolve(request.method(), &request.accept(), request.content_type())
        };

        match outcome {
            Ok(Dispatch { route, accept }) => {
                tracing::debug!(route = %route, accept = %accept, "dispatching request");
                ctx.set_resolved_media_type(accept);
                (self.routes[route.0].handler)(ctx).await
            }
            Err(e) => {
                tracing::debug!(
                    method = %ctx.request().method(),
                    path = ctx.request().path(),
                    status = e.status().as_u16(),
                    error = %e,
                    "no route selected"
                );
                e.into_response()
            }
        }
    }

    /// Wrap `request` in a [`Context`] and [`dispatch`](Router::dispatch) it.
    pub async fn route(&self, request: Request) -> Response {
        self.dispatch(Context::new(request, Arc::clone(&self.renderer)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = "application/vnd.acme.innersource+json; v=1";
    const V2: &str = "application/vnd.acme.innersource+json; v=2";
    const WILDCARD_SUFFIX: &str = "application/vnd.acme.innersource+*";
    const INVALID: &str = "application/vnd.acme.innersource++json";
    const UNSUPPORTED: &str = "application/vnd.company.domain+xml";

    fn respond_with(status: StatusCode) -> impl IntoHandler {
        move |_ctx: Context| async move { Response::new(status) }
    }

    // Handler that echoes the resolved media type in the body.
    async fn echo(ctx: Context) -> Response {
        Response::new(StatusCode::Ok).body(ctx.resolved_media_type().into_inner())
    }

    fn request(method: Method, accept: Option<&str>, content_type: Option<&str>) -> Request {
        let mut req = Request::new(method, "/");
        if let Some(accept) = accept {
            req = req.with_header("Accept", accept);
        }
        if let Some(content_type) = content_type {
            req = req.with_header("Content-Type", content_type);
        }
        req
    }

    // GET produces v1,v2; POST consumes v1; POST consumes v2; PUT consumes v2 produces v1.
    fn versioned_router() -> Router {
        let mut router = Router::new();
        router.get(respond_with(StatusCode::Ok)).produce([V1, V2]).register().unwrap();
        router.post(respond_with(StatusCode::Created)).consume([V1]).register().unwrap();
        router.post(respond_with(StatusCode::Created)).consume([V2]).register().unwrap();
        router
            .put(respond_with(StatusCode::Ok))
            .produce([V1])
            .consume([V2])
            .register()
            .unwrap();
        router
    }

    #[test]
    fn registration_assigns_sequential_ids() {
        let router = versioned_router();
        assert_eq!(router.len(), 4);
        assert_eq!(router.routes()[3].method(), &Method::Put);
        let put = router.lookup(RouteId(3)).unwrap();
        assert_eq!(put.consumes()[0].fully_qualified_type(), V2);
        assert!(!put.is_default());
        assert!(router.lookup(RouteId(4)).is_none());
    }

    #[test]
    fn invalid_declaration_is_rejected() {
        let mut router = Router::new();
        let err = router
            .get(respond_with(StatusCode::Ok))
            .produce([V1, "not a media type"])
            .register()
            .unwrap_err();
        assert_eq!(err, RouteError::InvalidMediaType("not a media type".into()));
        assert!(router.is_empty());

        assert!(
            router
                .register(Method::Post, respond_with(StatusCode::Ok), &[""], &[], false)
                .is_err()
        );
    }

    #[test]
    fn register_in_one_call() {
        let mut router = Router::new();
        let id = router
            .register(Method::Get, respond_with(StatusCode::Ok), &[], &[V1], true)
            .unwrap();
        assert_eq!(id.index(), 0);
        assert!(router.lookup(id).unwrap().is_default());
    }

    #[tokio::test]
    async fn get_with_supported_accept() {
        let router = versioned_router();
        let res = router.route(request(Method::Get, Some(V1), None)).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[test]
    fn highest_quality_accept_is_resolved() {
        let router = versioned_router();
        let dispatch = router
            .resolve(&Method::Get, &format!("{V1}; q=0.8, {V2}; q=1.0"), "")
            .unwrap();
        assert_eq!(dispatch.route, RouteId(0));
        assert_eq!(dispatch.accept.as_str(), V2);
    }

    #[test]
    fn explicit_quality_is_more_precise() {
        let router = versioned_router();
        let dispatch = router
            .resolve(&Method::Get, &format!("{V1}, {V2}; q=1.0"), "")
            .unwrap();
        assert_eq!(dispatch.accept.as_str(), V2);
    }

    #[tokio::test]
    async fn post_selects_route_by_content_type() {
        let router = versioned_router();
        let dispatch = router.resolve(&Method::Post, "", V2).unwrap();
        assert_eq!(dispatch.route, RouteId(2));
        // No produced types: the inbound Accept is kept.
        assert!(dispatch.accept.is_empty());

        let res = router.route(request(Method::Post, None, Some(V2))).await;
        assert_eq!(res.status(), StatusCode::Created);
    }

    #[tokio::test]
    async fn put_needs_both_headers_to_agree() {
        let router = versioned_router();
        let res = router.route(request(Method::Put, Some(V1), Some(V2))).await;
        assert_eq!(res.status(), StatusCode::Ok);

        let err = router.resolve(&Method::Put, V2, V2).unwrap_err();
        assert_eq!(err, DispatchError::NotAcceptable);
    }

    #[tokio::test]
    async fn wildcard_accept_dispatches_on_content_type_alone() {
        let mut router = Router::new();
        router.post(echo).consume([V1]).produce([V1]).register().unwrap();
        router.post(echo).consume([V2]).register().unwrap();

        // Neither route is a default one, yet a wildcard on top of Accept
        // lets the Content-Type match decide.
        let dispatch = router.resolve(&Method::Post, "*/*", V1).unwrap();
        assert_eq!(dispatch.route, RouteId(0));
        assert_eq!(dispatch.accept.as_str(), V1);

        let dispatch = router.resolve(&Method::Post, "*/*", V2).unwrap();
        assert_eq!(dispatch.route, RouteId(1));
        assert_eq!(dispatch.accept.as_str(), "*/*");

        let accept = format!("*/*, {V2};q=0.5");
        let dispatch = router.resolve(&Method::Post, &accept, V1).unwrap();
        assert_eq!(dispatch.route, RouteId(0));
        assert_eq!(dispatch.accept.as_str(), V1);

        let res = router.route(request(Method::Post, Some("*/*"), Some(V1))).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), V1.as_bytes());

        // Without a Content-Type the wildcard only reaches default routes.
        assert!(router.resolve(&Method::Post, "*/*", "").is_err());
    }

    #[tokio::test]
    async fn post_rejects_accept_produced_by_another_route() {
        let mut router = Router::new();
        router
            .post(respond_with(StatusCode::Created))
            .consume([V1])
            .produce([V1])
            .register()
            .unwrap();
        router
            .post(respond_with(StatusCode::Created))
            .consume([V2])
            .produce([V2])
            .register()
            .unwrap();

        let dispatch = router.resolve(&Method::Post, V1, V1).unwrap();
        assert_eq!(dispatch.route, RouteId(0));

        let err = router.resolve(&Method::Post, V2, V1).unwrap_err();
        assert_eq!(
            err,
            DispatchError::UnsupportedMediaType {
                header: "Accept-Post".into(),
                supported: format!("{V1}, {V2}"),
            }
        );

        let res = router.route(request(Method::Post, Some(V2), Some(V1))).await;
        assert_eq!(res.status(), StatusCode::UnsupportedMediaType);
        assert_eq!(res.headers().get("Accept-Post"), Some(format!("{V1}, {V2}").as_str()));
    }

    #[tokio::test]
    async fn default_route_answers_wildcards_with_first_produced_type() {
        let mut router = Router::new();
        router.get(echo).produce([V1, V2]).set_default().register().unwrap();

        for accept in ["*/*", "*"] {
            let res = router.route(request(Method::Get, Some(accept), None)).await;
            assert_eq!(res.status(), StatusCode::Ok);
            assert_eq!(res.body_ref(), V1.as_bytes());
        }
    }

    #[test]
    fn wildcard_accept_skips_non_default_routes() {
        let router = versioned_router();
        assert_eq!(
            router.resolve(&Method::Get, "*/*", ""),
            Err(DispatchError::NotAcceptable)
        );
    }

    #[tokio::test]
    async fn wildcard_content_type_defaults_the_response_type() {
        let mut router = Router::new();
        router
            .put(respond_with(StatusCode::Created))
            .consume([WILDCARD_SUFFIX, "*", "*/*"])
            .produce([V1])
            .set_default()
            .register()
            .unwrap();

        for content_type in ["*", "*/*"] {
            let dispatch = router.resolve(&Method::Put, "", content_type).unwrap();
            assert_eq!(dispatch.accept.as_str(), V1);
            let res = router.route(request(Method::Put, None, Some(content_type))).await;
            assert_eq!(res.status(), StatusCode::Created);
        }
    }

    #[tokio::test]
    async fn missing_headers_are_negotiated() {
        let mut router = Router::new();
        router.get(respond_with(StatusCode::Ok)).produce([V1, V2]).register().unwrap();
        router.post(respond_with(StatusCode::Created)).consume([V1, V2]).register().unwrap();
        router.patch(respond_with(StatusCode::Created)).consume([V1, V2]).register().unwrap();

        let res = router.route(request(Method::Get, None, None)).await;
        assert_eq!(res.status(), StatusCode::NotAcceptable);
        assert!(res.body_ref().is_empty());

        let res = router.route(request(Method::Post, None, None)).await;
        assert_eq!(res.status(), StatusCode::UnsupportedMediaType);
        assert_eq!(res.headers().get("Accept-Post"), Some(format!("{V1}, {V2}").as_str()));

        let res = router.route(request(Method::Patch, None, None)).await;
        assert_eq!(res.status(), StatusCode::UnsupportedMediaType);
        assert_eq!(res.headers().get("Accept-Patch"), Some(format!("{V1}, {V2}").as_str()));
    }

    #[tokio::test]
    async fn unsupported_headers() {
        let mut router = versioned_router();
        router
            .patch(respond_with(StatusCode::Ok))
            .produce([V1])
            .consume([V1, V2])
            .register()
            .unwrap();

        for method in [Method::Get, Method::Put] {
            let res = router.route(request(method, Some(UNSUPPORTED), None)).await;
            assert_eq!(res.status(), StatusCode::NotAcceptable);
        }

        let res = router.route(request(Method::Post, None, Some(UNSUPPORTED))).await;
        assert_eq!(res.status(), StatusCode::UnsupportedMediaType);
        assert_eq!(res.headers().get("Accept-Post"), Some(format!("{V1}, {V2}").as_str()));

        let res = router.route(request(Method::Patch, None, Some(UNSUPPORTED))).await;
        assert_eq!(res.status(), StatusCode::UnsupportedMediaType);
        assert_eq!(res.headers().get("Accept-Patch"), Some(format!("{V1}, {V2}").as_str()));
    }

    #[test]
    fn advertisement_falls_back_to_produced_types() {
        let mut router = Router::new();
        router.post(respond_with(StatusCode::Ok)).produce([V1]).register().unwrap();
        router.post(respond_with(StatusCode::Ok)).consume([V2]).register().unwrap();

        let err = router.resolve(&Method::Post, "", UNSUPPORTED).unwrap_err();
        assert_eq!(
            err,
            DispatchError::UnsupportedMediaType {
                header: "Accept-Post".into(),
                supported: format!("{V1}, {V2}"),
            }
        );
    }

    #[tokio::test]
    async fn malformed_headers_are_not_acceptable() {
        let router = versioned_router();

        let res = router.route(request(Method::Post, None, Some(INVALID))).await;
        assert_eq!(res.status(), StatusCode::NotAcceptable);

        let res = router.route(request(Method::Get, Some(INVALID), None)).await;
        assert_eq!(res.status(), StatusCode::NotAcceptable);

        assert!(matches!(
            router.resolve(&Method::Get, INVALID, ""),
            Err(DispatchError::InvalidHeader { header: "Accept", .. })
        ));
    }

    #[tokio::test]
    async fn unknown_method_is_not_allowed() {
        let router = versioned_router();
        let res = router.route(request(Method::Trace, None, None)).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);

        let empty = Router::new();
        assert_eq!(
            empty.resolve(&Method::Get, "", ""),
            Err(DispatchError::NoRouteForMethod(Method::Get))
        );
    }

    #[test]
    fn method_match_is_case_insensitive() {
        let router = versioned_router();
        let custom: Method = "get".parse().unwrap();
        assert!(router.resolve(&custom, V1, "").is_ok());
        let odd = Method::Custom("gEt".into());
        assert!(router.resolve(&odd, V1, "").is_ok());
    }

    #[test]
    fn placeholder_route_resolves_concrete_type() {
        let mut router = Router::new();
        router
            .get(respond_with(StatusCode::Ok))
            .produce(["application/vnd.foo+*; v=2"])
            .register()
            .unwrap();

        let dispatch = router
            .resolve(&Method::Get, "application/vnd.foo+yaml;v=2", "")
            .unwrap();
        assert_eq!(dispatch.accept.as_str(), "application/vnd.foo+yaml; v=2");
        assert_eq!(
            router.resolve(&Method::Get, "application/vnd.foo+yaml;v=3", ""),
            Err(DispatchError::NotAcceptable)
        );
    }

    #[test]
    fn first_registered_route_wins() {
        let mut router = Router::new();
        router.get(respond_with(StatusCode::Ok)).produce([V1]).register().unwrap();
        router.get(respond_with(StatusCode::Accepted)).produce([V1]).register().unwrap();
        assert_eq!(router.resolve(&Method::Get, V1, "").unwrap().route, RouteId(0));
    }
}
