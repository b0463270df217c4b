use axum::{routing::post, Router};

use crate::state::AppState;

use super::push_handlers::{subscribe, unsubscribe};

pub fn push_routes() -> Router<AppState> {
    Router::new().route("/subscribe", post(subscribe).delete(unsubscribe))
}
