// src/handlers/messages.rs
//! Authenticated HTTP read surface. Reading a history marks the caller's
//! rows in it as read, same as joining the room does.

use crate::error::ChatError;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::Identity;
use crate::models::message::{ConversationSummary, DirectConversationSummary, Message};
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    response::Json,
    routing::{get, patch},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self { success: true, data })
    }
}

pub fn message_routes() -> Router {
    Router::new()
        .route("/mensajes/tutoria/:session_id", get(session_history))
        .route("/mensajes/conversaciones", get(list_conversations))
        .route("/mensajes/no-leidos", get(unread_count))
        .route("/mensajes/directos", get(list_direct_conversations))
        .route("/mensajes/directos/:peer_id", get(direct_history))
        .route("/mensajes/leido/:message_id", patch(mark_message_read))
        .layer(axum::middleware::from_fn(auth_middleware))
}

async fn session_history(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Message>>>, ChatError> {
    let messages = state.gateway.session_history(&identity, &session_id).await?;
    Ok(ApiResponse::ok(messages))
}

async fn list_conversations(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<ConversationSummary>>>, ChatError> {
    let conversations = state.conversations.list_conversations(&identity).await?;
    Ok(ApiResponse::ok(conversations))
}

async fn unread_count(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<i64>>, ChatError> {
    let total = state.conversations.total_unread(&identity).await?;
    Ok(ApiResponse::ok(total))
}

async fn list_direct_conversations(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<DirectConversationSummary>>>, ChatError> {
    let conversations = state.conversations.list_direct_conversations(&identity).await?;
    Ok(ApiResponse::ok(conversations))
}

async fn direct_history(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(peer_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Message>>>, ChatError> {
    let messages = state.gateway.direct_history(&identity, &peer_id).await?;
    Ok(ApiResponse::ok(messages))
}

async fn mark_message_read(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<String>,
) -> Result<Json<ApiResponse<Message>>, ChatError> {
    let message_id = Uuid::parse_str(message_id.trim())
        .map_err(|_| ChatError::Validation("malformed message id".to_string()))?;
    let message = state.gateway.mark_message_read(&identity, message_id).await?;
    Ok(ApiResponse::ok(message))
}
