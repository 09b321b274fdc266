//! Account service routes

use axum::{
    Form, Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::{
    error::{AuthError, AuthResult},
    models::{User, UserResponse},
    state::AppState,
    validation,
};

/// Request for local registration
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Form fields for password login
#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Request for federated login
#[derive(Deserialize)]
pub struct FederatedLoginRequest {
    /// Opaque identity assertion issued by the provider
    pub credential: String,
}

/// Response for token generation
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Create the router for the account service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/auth/federated", post(federated_login))
        .route("/users/me", get(current_user))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "accounts"
    }))
}

/// Local registration endpoint
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    validation::validate_username(&payload.username).map_err(AuthError::Validation)?;
    validation::validate_email(&payload.email).map_err(AuthError::Validation)?;
    validation::validate_password(&payload.password).map_err(AuthError::Validation)?;

    let user = state
        .accounts
        .register_local(&payload.username, &payload.email, &payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Password login endpoint
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .accounts
        .authenticate_local(&form.username, &form.password)
        .await?;

    token_response(&state, &user)
}

/// Federated login endpoint
pub async fn federated_login(
    State(state): State<AppState>,
    Json(payload): Json<FederatedLoginRequest>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .accounts
        .authenticate_federated(&payload.credential)
        .await?;

    token_response(&state, &user)
}

/// Profile of the bearer of the session token
pub async fn current_user(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> AuthResult<impl IntoResponse> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AuthError::Unauthorized)?;

    let user = state.accounts.resolve_session_token(bearer.token()).await?;

    Ok(Json(UserResponse::from(&user)))
}

fn token_response(state: &AppState, user: &User) -> AuthResult<(StatusCode, Json<TokenResponse>)> {
    let access_token = state.accounts.issue_session_token(user)?;

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: state.accounts.token_expiry(),
        }),
    ))
}
