use crate::config::AppState;
use crate::ctx::Ctx;
use crate::directory::{counterparts, Directory};
use crate::error::Result;
use axum::{
    extract::{Query, State},
    Json,
};
use chat_common::Identity;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<Identity>,
}

/// GET /users?q=
///
/// People the caller can message.
pub async fn list_users(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(query): Query<UsersQuery>,
) -> Result<Json<UsersResponse>> {
    info!("GET /users - {}", ctx.user_id());

    let all = state.auth.list().await?;
    let users = counterparts(all, ctx.identity(), query.q.as_deref());

    Ok(Json(UsersResponse { users }))
}
