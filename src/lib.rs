//! Lectio Server
//!
//! Backend for a social shared-reading platform: EPUB books are uploaded
//! and their package metadata extracted once, time-boxed shared readings
//! are opened over them, participants annotate passages and track progress.
//!
//! # Modules
//!
//! - `epub`: container/package-document extraction and chapter access
//! - `storage`: local archive storage
//! - `db`: SQLite repositories (books, readings, annotations)
//! - `routes`: the REST surface

pub mod config;
pub mod db;
pub mod epub;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Assemble the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_size = state.config().storage.max_upload_size;

    Router::new()
        .nest("/health", routes::health::router())
        .nest("/api/v1/books", routes::books::router(max_upload_size))
        .nest("/api/v1/readings", routes::readings::router())
        .nest("/api/v1/annotations", routes::annotations::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
