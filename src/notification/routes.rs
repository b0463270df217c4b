use axum::{
    routing::{delete, get, patch},
    Router,
};

use crate::state::AppState;

use super::notification_handlers::{delete_notification, get_notifications, mark_notification_read};

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_notifications))
        .route("/:id/read", patch(mark_notification_read))
        .route("/:id", delete(delete_notification))
}
