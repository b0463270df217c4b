use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::{
    error::{AppError, Result},
    middleware::AuthUser,
    state::AppState,
};

use super::push_dto::{SubscribeRequest, UnsubscribeRequest};

/// Register this device for push, or refresh its keys
#[utoipa::path(
    post,
    path = "/api/push/subscribe",
    request_body = SubscribeRequest,
    responses(
        (status = 201, description = "Subscription stored"),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "push",
    security(("bearer_auth" = []))
)]
pub async fn subscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<SubscribeRequest>,
) -> Result<StatusCode> {
    payload.validate()?;

    let subscription = state
        .subscriptions
        .upsert(user_id, &payload.endpoint, &payload.keys)
        .await?;
    tracing::debug!("Push subscription {} stored for user {}", subscription.id, user_id);

    Ok(StatusCode::CREATED)
}

/// Stop push delivery to this device
#[utoipa::path(
    delete,
    path = "/api/push/subscribe",
    request_body = UnsubscribeRequest,
    responses(
        (status = 204, description = "Subscription removed"),
        (status = 404, description = "Subscription not found"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "push",
    security(("bearer_auth" = []))
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UnsubscribeRequest>,
) -> Result<StatusCode> {
    payload.validate()?;

    if state
        .subscriptions
        .delete_by_endpoint(user_id, &payload.endpoint)
        .await?
        == 0
    {
        return Err(AppError::NotFound("Subscription not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
