//! API layer - HTTP handlers and routing
//!
//! Two routers come out of here:
//! - the editor router, JSON endpoints behind [`middleware::require_editor`],
//!   meant to be nested by the host (e.g. under `/editor`)
//! - the public router: published posts, pages, comments and the RSS feed

pub mod authors;
pub mod categories;
pub mod comments;
pub mod common;
pub mod editor;
pub mod middleware;
pub mod pages;
pub mod posts;
pub mod public;

use axum::{middleware as axum_middleware, Router};

pub use middleware::{ApiError, AppState};

/// Build the editor router
pub fn editor_router(state: AppState) -> Router {
    Router::new()
        .merge(editor::router())
        .merge(categories::router())
        .nest("/pages", pages::router())
        .nest("/posts", posts::router())
        .nest("/comments", comments::router())
        .nest("/authors", authors::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_editor,
        ))
        .with_state(state)
}

/// Build the public router
pub fn public_router(state: AppState) -> Router {
    public::router().with_state(state)
}
