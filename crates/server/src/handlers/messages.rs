//! Persistence API
//!
//! Persisting a message does not broadcast it. The sending client announces
//! it on the live channel afterwards, so a failed announce never rolls back
//! the stored message.

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chat_common::{IdentityId, Message};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SendMessageInput {
    pub to: IdentityId,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
}

/// POST /messages
pub async fn post_message(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<SendMessageInput>,
) -> Result<(StatusCode, Json<Message>)> {
    info!("POST /messages - {} -> {}", ctx.user_id(), input.to);

    let message = state
        .store
        .append(ctx.user_id(), &input.to, &input.text)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/{peer_id}
pub async fn get_messages(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(peer_id): Path<String>,
) -> Result<Json<HistoryResponse>> {
    info!("GET /messages/{} - {}", peer_id, ctx.user_id());

    let peer = IdentityId::new(peer_id);
    let messages = state.store.history(ctx.user_id(), &peer).await?;

    Ok(Json(HistoryResponse { messages }))
}
