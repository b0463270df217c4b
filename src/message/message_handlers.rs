use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{error::Result, middleware::AuthUser, state::AppState};

use super::{
    message_dto::{ConversationQuery, MarkReadResponse, SendMessageRequest},
    message_models::Message,
};

/// Send a message to another user
#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent successfully", body = Message),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    payload.validate()?;

    let message = state
        .message_service
        .send(user_id, payload.recipient_id, &payload.content)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Get a page of the conversation with another user, newest first
#[utoipa::path(
    get,
    path = "/api/messages/{peer_id}",
    tag = "messages",
    params(
        ("peer_id" = Uuid, Path, description = "The other participant"),
        ConversationQuery
    ),
    responses(
        (status = 200, description = "Messages, newest first", body = Vec<Message>),
        (status = 400, description = "Invalid query"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(peer_id): Path<Uuid>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Vec<Message>>> {
    let messages = state
        .message_service
        .conversation(user_id, peer_id, query.before, query.limit)
        .await?;

    Ok(Json(messages))
}

/// Mark every message received from a peer as read
#[utoipa::path(
    put,
    path = "/api/messages/{peer_id}/read",
    tag = "messages",
    params(
        ("peer_id" = Uuid, Path, description = "The other participant")
    ),
    responses(
        (status = 200, description = "Number of messages newly marked read", body = MarkReadResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(peer_id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>> {
    let updated = state
        .message_service
        .mark_conversation_read(user_id, peer_id)
        .await?;

    Ok(Json(MarkReadResponse { updated }))
}
