//! HTTP layer exposing extraction, tier status and retrieval.

pub mod routes;
pub mod types;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{config::Settings, resources::SharedResourceCache, HybridCoordinator};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: HybridCoordinator,
    pub resources: Arc<SharedResourceCache>,
}

/// Routes without a bound listener, so tests can drive them directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/extract", post(routes::extract))
        .route("/status", get(routes::status))
        .route("/resources", get(routes::resources))
        .route("/search", get(routes::search))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(settings: Settings, host: String, port: u16) -> Result<()> {
    let coordinator = HybridCoordinator::from_settings(&settings)?;
    let resources = SharedResourceCache::install(Arc::new(SharedResourceCache::from_settings(
        &settings,
    )));
    let state = AppState {
        coordinator: coordinator.clone(),
        resources,
    };

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!(%addr, "serving medner API");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    coordinator.shutdown();
    Ok(())
}
