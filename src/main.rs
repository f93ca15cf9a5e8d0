//! pagewright demo server
//!
//! Serves the editor API under `/editor`, the public routes at the root and
//! snippet images under their URL prefix, all configured from `config.yml`.

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagewright::{
    cache::create_cache,
    config::Config,
    db,
    services::{EmailNotifier, TokenAccessControl},
    Cms,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagewright=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting pagewright...");

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let mut builder = Cms::builder(pool, config.cms.clone()).with_cache(create_cache(&config.cache));
    if config.email.enabled {
        let notifier = EmailNotifier::new(config.email.clone(), Arc::new(config.cms.clone()))?;
        builder = builder.with_hooks(Arc::new(notifier));
        tracing::info!("Email notifications enabled");
    }
    let mut cms = builder.build().await?;

    match config.editor.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            let user = cms.users.ensure_user(&config.editor.user_name).await?;
            cms.access = Arc::new(TokenAccessControl::new(
                token,
                user,
                config.editor.denied_permissions.iter().copied(),
            ));
            tracing::info!("Editor open to token holder as {}", config.editor.user_name);
        }
        None => tracing::warn!("No editor token configured; the editor is closed"),
    }
    let cms = Arc::new(cms);

    let cors = CorsLayer::new()
        .allow_origin(config.server.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let snippet_prefix = format!("/{}", cms.settings.snippet_image_url_prefix.trim_matches('/'));
    let app = Router::new()
        .nest("/editor", cms.editor_router())
        .merge(cms.public_router())
        .nest_service(&snippet_prefix, ServeDir::new(cms.snippets.dir()))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
