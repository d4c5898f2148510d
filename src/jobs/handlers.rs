use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::session::AuthUser,
    error::ApiError,
    jobs::{
        dto::{JobRequest, JobResponse, Pagination},
        repo,
    },
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", axum::routing::post(create_job))
        .route("/jobs/:id", axum::routing::put(update_job).delete(delete_job))
}

fn validate(payload: &JobRequest) -> Result<(), ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::Validation("Title is required"));
    }
    if payload.company.trim().is_empty() {
        return Err(ApiError::Validation("Company is required"));
    }
    Ok(())
}

#[instrument(skip(state))]
pub async fn list_jobs(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<JobResponse>>, ApiError> {
    let jobs = repo::list_by_user(&state.db, user_id, p.limit, p.offset).await?;
    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_job(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = repo::find(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(job.into()))
}

#[instrument(skip(state, payload))]
pub async fn create_job(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<JobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    validate(&payload)?;
    let job = repo::create(&state.db, user_id, &payload.into()).await?;
    Ok((StatusCode::CREATED, Json(job.into())))
}

#[instrument(skip(state, payload))]
pub async fn update_job(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<JobRequest>,
) -> Result<Json<JobResponse>, ApiError> {
    validate(&payload)?;
    let job = repo::update(&state.db, user_id, id, &payload.into())
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(job.into()))
}

#[instrument(skip(state))]
pub async fn delete_job(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !repo::delete(&state.db, user_id, id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::OK)
}
