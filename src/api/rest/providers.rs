use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::provider::{Candidate, GeoPoint, Provider};
use crate::models::worker::{Interaction, Worker};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers", get(list_providers))
        .route("/providers/:id/history", get(provider_history))
        .route("/recommendations", post(recommend))
        .route("/garages/:name/worker", get(garage_worker))
}

#[derive(Deserialize)]
pub struct ProviderQuery {
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct RecommendationRequest {
    pub lat: f64,
    pub lon: f64,
    pub breakdown_type: String,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

async fn list_providers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProviderQuery>,
) -> Result<Json<Vec<Provider>>, AppError> {
    let providers = state
        .dispatcher
        .list_providers(query.category.as_deref())
        .await?;
    Ok(Json(providers))
}

async fn recommend(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RecommendationRequest>,
) -> Result<Json<Vec<Candidate>>, AppError> {
    if payload.limit == Some(0) {
        return Err(AppError::InvalidInput("limit must be > 0".to_string()));
    }

    let candidates = state
        .dispatcher
        .recommend(
            GeoPoint::new(payload.lat, payload.lon),
            &payload.breakdown_type,
            payload.offset,
            payload.limit,
        )
        .await?;
    Ok(Json(candidates))
}

async fn provider_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Interaction>>, AppError> {
    Ok(Json(state.dispatcher.provider_history(&id).await?))
}

async fn garage_worker(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Worker>, AppError> {
    Ok(Json(state.dispatcher.worker_for_garage(&name).await?))
}
