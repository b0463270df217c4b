use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

use super::message_handlers::{get_conversation, mark_conversation_read, send_message};

pub fn message_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(send_message))
        .route("/:peer_id", get(get_conversation))
        .route("/:peer_id/read", put(mark_conversation_read))
}
