use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    message::MessageService,
    middleware::bearer_token,
    state::AppState,
    websocket::{
        presence::WsSender,
        types::{ClientEvent, ErrorPayload, ServerEvent, TypingPayload},
    },
};

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler. The credential is checked before the upgrade.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers));

    let user_id = match token {
        Some(token) => match state.identity.verify(token).await {
            Ok(user_id) => user_id,
            Err(e) => return e.into_response(),
        },
        None => {
            return AppError::Authentication("Missing credentials".to_string()).into_response()
        }
    };

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, user_id, state)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let connection_id = state.presence.register(user_id, tx.clone());

    // Spawn task to send events from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("Failed to encode server event: {}", e),
            }
        }
    });

    // Frames are handled one at a time. Each runs in its own task so that
    // a store write already started outlives an abrupt disconnect.
    let service = state.message_service.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => {
                    let service = service.clone();
                    let tx = tx.clone();
                    let frame = tokio::spawn(async move {
                        handle_frame(&text, user_id, &service, &tx).await;
                    });
                    if let Err(e) = frame.await {
                        tracing::error!("Frame handler for user {} panicked: {}", user_id, e);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Some(user_id) = state.presence.unregister(&connection_id) {
        tracing::debug!("User {} has no open connections left", user_id);
    }
}

/// Run one client frame. Failures go back to this connection only.
pub(crate) async fn handle_frame(
    text: &str,
    user_id: Uuid,
    service: &MessageService,
    reply: &WsSender,
) {
    if let Err(e) = process_client_event(text, user_id, service).await {
        tracing::warn!("Rejected frame from user {}: {}", user_id, e);
        let _ = reply.send(ServerEvent::Error(ErrorPayload {
            message: e.public_message(),
        }));
    }
}

async fn process_client_event(text: &str, user_id: Uuid, service: &MessageService) -> Result<()> {
    let event: ClientEvent = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid event format: {}", e)))?;

    match event {
        ClientEvent::SendMessage { to, content } => {
            service.send(user_id, to, &content).await?;
        }
        ClientEvent::Typing { to } => {
            service.relay(to, ServerEvent::Typing(TypingPayload { from: user_id }));
        }
        ClientEvent::StopTyping { to } => {
            service.relay(to, ServerEvent::StopTyping(TypingPayload { from: user_id }));
        }
        ClientEvent::MarkConversationRead { peer_id } => {
            service.mark_conversation_read(user_id, peer_id).await?;
        }
    }

    Ok(())
}
