use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::request::{CreatedDispatch, DispatchRequest, NewDispatch};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/completed", get(list_completed))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/accept", post(accept))
        .route("/requests/:id/reject", post(reject))
        .route("/requests/:id/assign-worker", post(assign_worker))
        .route("/requests/:id/verify-completion", post(verify_completion))
}

#[derive(Deserialize)]
pub struct CandidateAction {
    pub candidate_id: String,
}

#[derive(Deserialize)]
pub struct AssignWorkerRequest {
    pub worker_id: String,
}

#[derive(Deserialize)]
pub struct VerifyCompletionRequest {
    pub code: String,
    pub worker_id: String,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewDispatch>,
) -> Result<Json<CreatedDispatch>, AppError> {
    Ok(Json(state.dispatcher.create(payload).await?))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchRequest>, AppError> {
    Ok(Json(state.dispatcher.detail(id).await?))
}

async fn list_completed(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DispatchRequest>>, AppError> {
    Ok(Json(state.dispatcher.completed().await?))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CandidateAction>,
) -> Result<Json<DispatchRequest>, AppError> {
    Ok(Json(state.dispatcher.accept(id, &payload.candidate_id).await?))
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CandidateAction>,
) -> Result<Json<DispatchRequest>, AppError> {
    Ok(Json(state.dispatcher.reject(id, &payload.candidate_id).await?))
}

async fn assign_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignWorkerRequest>,
) -> Result<Json<DispatchRequest>, AppError> {
    Ok(Json(
        state
            .dispatcher
            .assign_worker(id, &payload.worker_id)
            .await?,
    ))
}

async fn verify_completion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyCompletionRequest>,
) -> Result<Json<DispatchRequest>, AppError> {
    Ok(Json(
        state
            .dispatcher
            .verify_completion(id, &payload.code, &payload.worker_id)
            .await?,
    ))
}
