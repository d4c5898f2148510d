use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tower_sessions::Session;
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{
            ChangePasswordRequest, ConfirmResetRequest, LoginRequest, MessageResponse,
            PublicUser, RegisterRequest, RequestResetRequest,
        },
        services,
        session::{AuthUser, SESSION_USER_ID_KEY},
    },
    error::ApiError,
    ratelimit::client_key,
    state::AppState,
};

/// Sent for every reset request, registered email or not.
const RESET_REQUESTED: &str = "If that email is registered, a reset link has been sent.";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/reset/request", post(request_reset))
        .route("/auth/reset/confirm", post(confirm_reset))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).delete(delete_me))
        .route("/me/password", put(change_password))
}

#[instrument(skip(state, headers, payload))]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    state.limiter.check(&client_key(&headers))?;
    payload.email = payload.email.trim().to_lowercase();

    let user = services::register(&state, &payload.email, &payload.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(PublicUser {
            id: user.id,
            email: user.email,
        }),
    ))
}

#[instrument(skip(state, headers, session, payload))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    state.limiter.check(&client_key(&headers))?;
    payload.email = payload.email.trim().to_lowercase();

    let user = services::login(&state, &payload.email, &payload.password).await?;

    // fresh session id on privilege change
    session.cycle_id().await?;
    session.insert(SESSION_USER_ID_KEY, user.id).await?;

    Ok(Json(PublicUser {
        id: user.id,
        email: user.email,
    }))
}

/// Destroys the session if there is one; calling it while unauthenticated is
/// still a 200.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode, ApiError> {
    session.flush().await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state, headers, payload))]
pub async fn request_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RequestResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.limiter.check(&client_key(&headers))?;
    let email = payload.email.trim().to_lowercase();

    services::request_reset(&state, &email).await?;
    Ok(Json(MessageResponse {
        message: RESET_REQUESTED,
    }))
}

#[instrument(skip(state, headers, payload))]
pub async fn confirm_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ConfirmResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.limiter.check(&client_key(&headers))?;

    services::consume_reset(&state, &payload.token, &payload.new_password).await?;
    Ok(Json(MessageResponse {
        message: "Password has been reset. You can now log in.",
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(PublicUser {
        id: user.id,
        email: user.email,
    }))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    services::change_password(
        &state,
        user_id,
        &payload.current_password,
        &payload.new_password,
    )
    .await?;
    Ok(Json(MessageResponse {
        message: "Password updated.",
    }))
}

#[instrument(skip(state, session))]
pub async fn delete_me(
    State(state): State<AppState>,
    session: Session,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, ApiError> {
    state.users.delete_user(user_id).await?;
    session.flush().await?;
    info!(%user_id, "account deleted");
    Ok(StatusCode::OK)
}
