//! Auth handlers

use crate::auth::NewUser;
use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::Result;
use axum::{extract::State, http::StatusCode, Json};
use chat_common::Identity;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: Identity,
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<NewUser>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    info!("POST /auth/signup - {}", req.email);

    let password = req.password.clone();
    let user = state.auth.signup(req).await?;
    let (user, session) = state.auth.login(&user.email, &password).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: session.token,
            user,
        }),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    info!("POST /auth/login - {}", req.email);

    let (user, session) = state.auth.login(&req.email, &req.password).await?;

    Ok(Json(AuthResponse {
        token: session.token,
        user,
    }))
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, ctx: Ctx) -> Result<StatusCode> {
    info!("POST /auth/logout - {}", ctx.user_id());
    state.auth.logout(ctx.token()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/me
pub async fn me(ctx: Ctx) -> Json<Identity> {
    Json(ctx.identity().clone())
}
