//! HTTP route handlers for Axum.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::warn;

use crate::{
    api::types::{ExtractRequest, ResourcesDto, SearchQuery},
    resources::search::{Retriever, SearchHit},
    ExtractionResult, Status,
};

use super::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub async fn extract(
    states: State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<ExtractionResult> {
    let coordinator = states.coordinator.clone();
    let result =
        tokio::task::spawn_blocking(move || coordinator.extract(&request.text, request.mode))
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(result))
}

pub async fn status(states: State<AppState>) -> Json<Status> {
    Json(states.coordinator.status())
}

pub async fn resources(states: State<AppState>) -> Json<ResourcesDto> {
    Json(ResourcesDto {
        resources: states.resources.stats(),
    })
}

pub async fn search(
    states: State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<SearchHit>> {
    let retriever = Retriever::new(states.resources.clone());
    let hits = tokio::task::spawn_blocking(move || retriever.search(&query.q, query.k))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            warn!(error = %e, "search failed");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })?;
    Ok(Json(hits))
}
