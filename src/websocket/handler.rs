use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::connctx::ConnCtx;
use super::connection::Connection;
use super::msg_broadcast_handler::handle_broadcast_message;
use super::msg_ping_handler::handle_ping_message;
use super::msg_presence_handler::{handle_track_message, handle_untrack_message};
use super::msg_subscribe_handler::{handle_subscribe_message, handle_unsubscribe_message};
use crate::collab::SessionContext;
use crate::models::ClientMessage;
use crate::services::auth_service::{authenticate, get_auth_token, AuthClaims};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Response {
    info!("New WebSocket connection attempt");

    // Anonymous connections are only allowed when no secret is configured
    let claims = match &state.config.cloud_auth_jwt_secret {
        None => None,
        Some(secret) => {
            let token = match get_auth_token(&headers, params.token.as_deref()) {
                Ok(token) => token,
                Err(e) => {
                    warn!("Rejecting WebSocket connection: {}", e);
                    return StatusCode::UNAUTHORIZED.into_response();
                }
            };
            match authenticate(&token, secret) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    warn!("Rejecting WebSocket connection: {}", e);
                    return StatusCode::UNAUTHORIZED.into_response();
                }
            }
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, claims: Option<AuthClaims>) {
    // Generate unique connection ID to identify this client
    let conn_id = Uuid::new_v4().to_string();
    let session = claims.as_ref().and_then(|c| SessionContext::from_claims(&c.claims));
    state.connections.insert(
        conn_id.clone(),
        ConnCtx {
            uid: claims.map(|c| c.uid),
            display_name: session.and_then(|s| s.display_name()),
            connected_at: Utc::now(),
        },
    );
    info!("WebSocket connection established with connection_id: {}", conn_id);

    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));
    let mut conn = Connection::new(conn_id.clone(), state.hub.clone(), sender);

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket error on {}: {}", conn_id, e);
                break;
            }
        };

        let msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(msg) => msg,
            Err(e) => {
                error!("Failed to parse message on {}: {}", conn_id, e);
                conn.send_error(None, format!("Invalid message: {}", e)).await;
                continue;
            }
        };

        match msg {
            ClientMessage::Subscribe { topic, config } => handle_subscribe_message(&mut conn, topic, config),
            ClientMessage::Unsubscribe { topic } => handle_unsubscribe_message(&mut conn, &topic),
            ClientMessage::Track { topic, payload } => handle_track_message(&conn, &topic, payload).await,
            ClientMessage::Untrack { topic } => handle_untrack_message(&conn, &topic).await,
            ClientMessage::Broadcast { topic, event, payload } => {
                handle_broadcast_message(&conn, &topic, &event, payload).await
            }
            ClientMessage::Ping => handle_ping_message(&conn).await,
        }
    }

    conn.close();
    state.connections.invalidate(&conn_id);
    info!("WebSocket connection {} terminated", conn_id);
}
