use crate::{
    message::{self, message_dto::*, routes::message_routes, Message},
    middleware::auth_middleware,
    notification::{self, routes::notification_routes, Notification, NotificationKind},
    push::{
        self,
        push_dto::{SubscribeRequest, UnsubscribeRequest},
        push_models::SubscriptionKeys,
        routes::push_routes,
    },
    state::AppState,
    websocket::ws_handler,
};
use axum::{middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        message::message_handlers::send_message,
        message::message_handlers::get_conversation,
        message::message_handlers::mark_conversation_read,
        notification::notification_handlers::get_notifications,
        notification::notification_handlers::mark_notification_read,
        notification::notification_handlers::delete_notification,
        push::push_handlers::subscribe,
        push::push_handlers::unsubscribe,
    ),
    components(
        schemas(
            Message,
            SendMessageRequest,
            MarkReadResponse,
            Notification,
            NotificationKind,
            SubscribeRequest,
            UnsubscribeRequest,
            SubscriptionKeys,
        )
    ),
    tags(
        (name = "messages", description = "Direct message history"),
        (name = "notifications", description = "Notification endpoints"),
        (name = "push", description = "Web Push registration")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Protected routes (auth required)
    let api_routes = Router::new()
        .nest("/messages", message_routes())
        .nest("/notifications", notification_routes())
        .nest("/push", push_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Authenticates itself before upgrading
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::jwt::create_access_token, state::tests::{in_memory_state, TEST_SECRET}};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", create_access_token(user, TEST_SECRET)),
            );
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_admin_messages_alice_and_she_reads_it() {
        let app = create_router(in_memory_state());
        let admin = Uuid::new_v4();
        let alice = Uuid::new_v4();

        let sent = call(
            &app,
            Method::POST,
            "/api/messages",
            Some(admin),
            Some(json!({ "recipientId": alice, "content": "Hello Alice!" })),
        )
        .await;
        assert_eq!(sent.status(), StatusCode::CREATED);

        let page = call(&app, Method::GET, &format!("/api/messages/{}", alice), Some(admin), None).await;
        assert_eq!(page.status(), StatusCode::OK);
        let page = json_body(page).await;
        assert_eq!(page[0]["content"], "Hello Alice!");
        assert_eq!(page[0]["senderId"], json!(admin));
        assert!(page[0]["readAt"].is_null());

        let read_uri = format!("/api/messages/{}/read", admin);
        let first = call(&app, Method::PUT, &read_uri, Some(alice), None).await;
        assert_eq!(json_body(first).await, json!({ "updated": 1 }));
        let second = call(&app, Method::PUT, &read_uri, Some(alice), None).await;
        assert_eq!(json_body(second).await, json!({ "updated": 0 }));

        let page = call(&app, Method::GET, &format!("/api/messages/{}", admin), Some(alice), None).await;
        assert!(!json_body(page).await[0]["readAt"].is_null());
    }

    #[tokio::test]
    async fn test_message_send_notifies_recipient() {
        let app = create_router(in_memory_state());
        let admin = Uuid::new_v4();
        let alice = Uuid::new_v4();

        call(
            &app,
            Method::POST,
            "/api/messages",
            Some(admin),
            Some(json!({ "recipientId": alice, "content": "Hello Alice!" })),
        )
        .await;

        let listed = json_body(call(&app, Method::GET, "/api/notifications", Some(alice), None).await).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["type"], "Message");
        assert_eq!(listed[0]["payload"]["preview"], "Hello Alice!");
        assert_eq!(listed[0]["actorId"], json!(admin));
        assert_eq!(listed[0]["read"], false);
    }

    #[tokio::test]
    async fn test_conversation_pagination_query() {
        let app = create_router(in_memory_state());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for i in 0..3 {
            call(
                &app,
                Method::POST,
                "/api/messages",
                Some(a),
                Some(json!({ "recipientId": b, "content": format!("m{}", i) })),
            )
            .await;
        }

        let newest = json_body(
            call(&app, Method::GET, &format!("/api/messages/{}?limit=2", b), Some(a), None).await,
        )
        .await;
        assert_eq!(newest.as_array().unwrap().len(), 2);
        assert_eq!(newest[0]["content"], "m2");
        assert_eq!(newest[1]["content"], "m1");

        let before = newest[1]["createdAt"].as_str().unwrap().to_string();
        let older = json_body(
            call(
                &app,
                Method::GET,
                &format!(
                    "/api/messages/{}?limit=2&before={}",
                    b,
                    urlencode(&before)
                ),
                Some(a),
                None,
            )
            .await,
        )
        .await;
        assert_eq!(older.as_array().unwrap().len(), 1);
        assert_eq!(older[0]["content"], "m0");
    }

    fn urlencode(value: &str) -> String {
        url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected() {
        let app = create_router(in_memory_state());
        let response = call(
            &app,
            Method::POST,
            "/api/messages",
            Some(Uuid::new_v4()),
            Some(json!({ "recipientId": Uuid::new_v4(), "content": "   " })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_notification_lifecycle() {
        let state = in_memory_state();
        let notifications = state.notification_service.clone();
        let app = create_router(state);
        let actor = Uuid::new_v4();
        let owner = Uuid::new_v4();

        let created = notifications
            .create_notification(
                owner,
                Some(actor),
                NotificationKind::MatchCancelled { match_id: Uuid::new_v4() },
            )
            .await
            .unwrap();
        let id = created.id.to_string();

        let listed = json_body(call(&app, Method::GET, "/api/notifications", Some(owner), None).await).await;
        assert_eq!(listed[0]["id"], json!(created.id));
        assert_eq!(listed[0]["actorId"], json!(actor));

        let foreign = call(&app, Method::PATCH, &format!("/api/notifications/{}/read", id), Some(actor), None).await;
        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

        let read = call(&app, Method::PATCH, &format!("/api/notifications/{}/read", id), Some(owner), None).await;
        assert_eq!(read.status(), StatusCode::OK);
        assert_eq!(json_body(read).await["read"], true);

        let deleted = call(&app, Method::DELETE, &format!("/api/notifications/{}", id), Some(owner), None).await;
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        let again = call(&app, Method::DELETE, &format!("/api/notifications/{}", id), Some(owner), None).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_users_cannot_raise_notifications_directly() {
        let app = create_router(in_memory_state());
        let owner = Uuid::new_v4();

        let response = call(
            &app,
            Method::POST,
            "/api/notifications",
            Some(Uuid::new_v4()),
            Some(json!({
                "recipientId": owner,
                "type": "Message",
                "payload": { "messageId": Uuid::new_v4(), "preview": "click here" }
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let listed = json_body(call(&app, Method::GET, "/api/notifications", Some(owner), None).await).await;
        assert!(listed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_subscribe_and_unsubscribe() {
        let state = in_memory_state();
        let subscriptions = state.subscriptions.clone();
        let app = create_router(state);
        let user = Uuid::new_v4();
        let body = json!({
            "endpoint": "https://push.example.com/send/abc",
            "keys": { "p256dh": "BKey", "auth": "secret" }
        });

        for _ in 0..2 {
            let response = call(&app, Method::POST, "/api/push/subscribe", Some(user), Some(body.clone())).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }
        assert_eq!(subscriptions.list_for_user(user).await.unwrap().len(), 1);

        let unsubscribe = json!({ "endpoint": "https://push.example.com/send/abc" });
        let removed = call(&app, Method::DELETE, "/api/push/subscribe", Some(user), Some(unsubscribe.clone())).await;
        assert_eq!(removed.status(), StatusCode::NO_CONTENT);
        let missing = call(&app, Method::DELETE, "/api/push/subscribe", Some(user), Some(unsubscribe)).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_subscription_is_rejected() {
        let app = create_router(in_memory_state());
        let response = call(
            &app,
            Method::POST,
            "/api/push/subscribe",
            Some(Uuid::new_v4()),
            Some(json!({ "endpoint": "not a url", "keys": { "p256dh": "k", "auth": "a" } })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_requires_credentials() {
        let app = create_router(in_memory_state());
        let response = call(&app, Method::GET, "/api/notifications", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_socket_handshake_rejects_bad_credentials() {
        let app = create_router(in_memory_state());

        let missing = call(&app, Method::GET, "/ws", None, None).await;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let forged = create_access_token(Uuid::new_v4(), "some-other-secret");
        let forged = call(&app, Method::GET, &format!("/ws?token={}", forged), None, None).await;
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

        // A valid credential gets past authentication; the plain request then
        // fails only because it is not an upgrade.
        let token = create_access_token(Uuid::new_v4(), TEST_SECRET);
        let valid = call(&app, Method::GET, &format!("/ws?token={}", token), None, None).await;
        assert_ne!(valid.status(), StatusCode::UNAUTHORIZED);
    }
}
