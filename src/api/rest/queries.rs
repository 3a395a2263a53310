use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::request::{DailyCount, DispatchRequest};
use crate::state::AppState;

const DEFAULT_RECENT_LIMIT: usize = 10;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/candidates/:id/open", get(open_for_candidate))
        .route("/actors/:id/settled", get(settled_for_actor))
        .route("/overview/daily", get(daily_counts))
        .route("/overview/today", get(today))
        .route("/requesters/:phone/active", get(active_for_requester))
        .route("/requesters/:phone/recent", get(recent_for_requester))
}

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

async fn open_for_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DispatchRequest>>, AppError> {
    Ok(Json(state.dispatcher.open_for_candidate(&id).await?))
}

async fn settled_for_actor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DispatchRequest>>, AppError> {
    Ok(Json(state.dispatcher.settled_for(&id).await?))
}

async fn daily_counts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DailyCount>>, AppError> {
    Ok(Json(state.dispatcher.daily_counts().await?))
}

async fn today(State(state): State<Arc<AppState>>) -> Result<Json<DailyCount>, AppError> {
    Ok(Json(state.dispatcher.overview_for(Utc::now()).await?))
}

async fn active_for_requester(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> Result<Json<DispatchRequest>, AppError> {
    state
        .dispatcher
        .active_for_requester(&phone)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no active request for {phone}")))
}

async fn recent_for_requester(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<DispatchRequest>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Ok(Json(
        state
            .dispatcher
            .recent_for_requester(&phone, limit)
            .await?,
    ))
}
