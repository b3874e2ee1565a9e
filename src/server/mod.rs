//! HTTP surface of the automation server.
//!
//! Handlers are thin: they resolve the active node through the catalog,
//! delegate to the engine client they got back, and map errors onto HTTP
//! statuses. All state shaping goes through the catalog.

mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::Result;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            catalog: Arc::new(Catalog::new()),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/catalog", get(routes::get_catalog))
        .route("/browser", post(routes::new_browser))
        .route("/browser/close", post(routes::close_browser))
        .route("/browser/close-all", post(routes::close_all_browsers))
        .route("/context", post(routes::new_context))
        .route("/context/close", post(routes::close_context))
        .route(
            "/context/cookies",
            get(routes::get_cookies).post(routes::set_cookie),
        )
        .route("/context/cookies/clear", post(routes::clear_cookies))
        .route("/page", post(routes::new_page))
        .route("/page/close", post(routes::close_page))
        .route("/switch/browser", post(routes::switch_browser))
        .route("/switch/context", post(routes::switch_context))
        .route("/switch/page", post(routes::switch_page))
        .route("/page/goto", post(routes::goto))
        .route("/page/reload", post(routes::reload))
        .route("/page/back", post(routes::back))
        .route("/page/forward", post(routes::forward))
        .route("/page/url", get(routes::page_url))
        .route("/page/title", get(routes::page_title))
        .route("/page/html", get(routes::page_html))
        .route("/page/text", get(routes::page_text))
        .route("/page/click", post(routes::click))
        .route("/page/type", post(routes::type_text))
        .route("/page/fill", post(routes::fill))
        .route("/page/press", post(routes::press))
        .route("/page/evaluate", post(routes::evaluate))
        .route("/page/wait-for", post(routes::wait_for))
        .route("/page/screenshot", get(routes::screenshot))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind, serve until ctrl-c, then tear every tracked browser down.
pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::new(config.clone());
    let app = router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("pilothouse v{} listening on http://{}", env!("CARGO_PKG_VERSION"), addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.catalog.close_all_browsers().await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested");
}
