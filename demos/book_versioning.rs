//! Versioned book API served from in-memory requests.
//!
//! `/api/books` answers in three versions of the book representation,
//! `/api/books/{id}/ratings` accepts one rating payload version. Each request
//! below goes through request logging, compression and the media-type router.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example book_versioning
//! cargo run --example book_versioning -- path/to/settings.yaml
//! ```

use conneg::context::Context;
use conneg::http::{Method, Request, Response, StatusCode};
use conneg::middleware::Pipeline;
use conneg::router::{RouteError, Router};
use conneg::Settings;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const BOOK_V1BETA1: &str = "application/vnd.acme.book+*;v=v1beta1";
const BOOK_V1BETA2: &str = "application/vnd.acme.book+*;    v=v1beta2";
const BOOK_V2: &str = "application/vnd.acme.book+*; v=v2";
const ADD_RATING_V1: &str = "application/vnd.acme.book.rating.add+json; v=v1";
const RATING_V2: &str = "application/vnd.acme.book.rating+json; v=v2";

#[derive(Serialize)]
struct BetaBook {
    name: String,
    rating: String,
}

#[derive(Serialize)]
struct V2Book {
    #[serde(rename = "fullName")]
    name: String,
    ratings: Vec<Rating>,
}

#[derive(Serialize, Deserialize)]
struct Rating {
    grade: String,
}

// `/api/books/{id}/ratings` -> `{id}`
fn book_id(path: &str) -> &str {
    path.trim_start_matches("/api/books/")
        .split('/')
        .next()
        .unwrap_or_default()
}

fn books() -> Result<Router, RouteError> {
    let mut router = Router::new();
    router
        .get(|ctx: Context| async move {
            // Long enough for compression to matter.
            let book = BetaBook {
                name: "lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod \
                       tempor incididunt ut labore et dolore magna aliqua"
                    .repeat(4),
                rating: "4".into(),
            };
            ctx.render(StatusCode::Created, &book)
        })
        .produce([BOOK_V1BETA1, BOOK_V1BETA2])
        .set_default()
        .register()?;
    router
        .get(|ctx: Context| async move {
            let book = V2Book {
                name: "GET V2".into(),
                ratings: vec![Rating { grade: "A".into() }],
            };
            ctx.render(StatusCode::Ok, &book)
        })
        .produce([BOOK_V2])
        .register()?;
    Ok(router)
}

fn ratings() -> Result<Router, RouteError> {
    let mut router = Router::new();
    router
        .post(|ctx: Context| async move {
            let id = book_id(ctx.request().path()).to_owned();
            match ctx.body::<Rating>() {
                Ok(rating) => ctx.render(
                    StatusCode::Created,
                    &Rating {
                        grade: format!("post rating {id}: {}", rating.grade),
                    },
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "rejecting rating payload");
                    Response::new(StatusCode::BadRequest)
                }
            }
        })
        .produce([RATING_V2])
        .consume([ADD_RATING_V1])
        .register()?;
    router
        .get(|ctx: Context| async move {
            let grade = format!("get rating: {}", book_id(ctx.request().path()));
            ctx.render(StatusCode::Ok, &Rating { grade })
        })
        .produce([RATING_V2])
        .register()?;
    Ok(router)
}

fn print(label: &str, response: Response) {
    let headers = response.headers().to_string();
    let body = response.body_ref();
    println!("── {label}");
    println!("{} {}", response.status().as_u16(), response.status().canonical_reason());
    print!("{headers}");
    match std::str::from_utf8(body) {
        Ok(text) if !response.headers().contains("Content-Encoding") => println!("{text}"),
        _ => println!("<{} bytes>", body.len()),
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    tracing::info!(?settings, "starting book versioning demo");

    let books = Pipeline::from_settings(books()?, &settings);
    let ratings = Pipeline::from_settings(ratings()?, &settings);

    let get = |accept: &str| Request::new(Method::Get, "/api/books").with_header("Accept", accept);

    let requests = [
        ("v2 as yaml", &books, get("application/vnd.acme.book+yaml; v=v2")),
        ("default version", &books, get("*/*")),
        (
            "preferred beta as xml",
            &books,
            get(
                "application/vnd.acme.book+json; v=v1beta1; q=0.5, \
                 application/vnd.acme.book+xml; v=v1beta2",
            ),
        ),
        (
            "gzip",
            &books,
            get("*/*").with_header("Accept-Encoding", "deflate;q=0.5, gzip"),
        ),
        ("unknown version", &books, get("application/vnd.acme.book+json; v=v9")),
        (
            "post rating",
            &ratings,
            Request::new(Method::Post, "/api/books/42/ratings")
                .with_header("Content-Type", ADD_RATING_V1)
                .with_header("Accept", RATING_V2)
                .with_body(r#"{"grade":"B+"}"#),
        ),
        (
            "post rating, old payload",
            &ratings,
            Request::new(Method::Post, "/api/books/42/ratings")
                .with_header("Content-Type", "application/json")
                .with_body(r#"{"grade":"B+"}"#),
        ),
    ];

    for (label, pipeline, request) in requests {
        print(label, pipeline.handle(request).await);
    }

    Ok(())
}
