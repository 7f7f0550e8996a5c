use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, CallbackQuery, LoginRequest, SignupRequest},
        jwt::AuthUser,
        services,
    },
    error::AuthError,
    state::AppState,
    users::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/google", get(google_login))
        .route("/auth/google/callback", get(google_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    let Json(payload) = payload?;
    services::signup(&state, payload).await.map(Json)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    let Json(payload) = payload?;
    services::login(&state, payload).await.map(Json)
}

#[instrument(skip(state))]
pub async fn google_login(State(state): State<AppState>) -> Result<Redirect, AuthError> {
    let url = services::begin_provider_login(&state).await?;
    Ok(Redirect::to(url.as_str()))
}

#[instrument(skip(state, query))]
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, AuthError> {
    if let Some(reason) = query.error {
        warn!(%reason, "provider denied authorization");
        return Err(AuthError::OAuthExchange(reason));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::Validation("Missing authorization code".into()))?;
    let csrf_state = query.state.ok_or(AuthError::InvalidOAuthState)?;

    let target = services::complete_provider_login(&state, &code, &csrf_state).await?;
    Ok(Redirect::to(target.as_str()))
}

#[instrument(skip(state, claims))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<User>, AuthError> {
    services::current_user(&state, &claims).await.map(Json)
}
