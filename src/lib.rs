//! # conneg
//!
//! Media-type versioned routing: one endpoint, several representations,
//! chosen per request from `Accept`, `Content-Type` and `Accept-Encoding`.
//!
//! ## Quick Start
//!
//! ```
//! use conneg::context::Context;
//! use conneg::http::{Method, Request, StatusCode};
//! use conneg::middleware::Pipeline;
//! use conneg::router::Router;
//!
//! #[derive(serde::Serialize)]
//! struct Book {
//!     title: &'static str,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut router = Router::new();
//! router
//!     .get(|ctx: Context| async move { ctx.render(StatusCode::Ok, &Book { title: "Dune" }) })
//!     .produce(["application/vnd.acme.book+*; v=2"])
//!     .set_default()
//!     .register()?;
//!
//! let pipeline = Pipeline::new(router);
//! let request = Request::new(Method::Get, "/books/1")
//!     .with_header("Accept", "application/vnd.acme.book+yaml; v=2");
//! let response = pipeline.handle(request).await;
//!
//! assert_eq!(response.status(), StatusCode::Ok);
//! assert_eq!(
//!     response.headers().get("Content-Type"),
//!     Some("application/vnd.acme.book+yaml; v=2")
//! );
//! assert_eq!(response.body_ref(), b"title: Dune\n");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod http;
pub mod middleware;
pub mod negotiation;
pub mod render;
pub mod router;

pub use config::{ConfigError, Settings};
pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::Pipeline;
pub use negotiation::{ContentEncoding, ResolvedMediaType, parse_media_types, select_encoding};
pub use render::{Format, RenderError, Renderer};
pub use router::{DispatchError, RouteError, RouteId, Router};
