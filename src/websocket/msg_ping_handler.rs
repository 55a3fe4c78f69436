use chrono::Utc;
use tracing::{debug, error};

use super::connection::Connection;
use crate::models::ServerMessage;

/// Handle PingMessage
pub async fn handle_ping_message(conn: &Connection) {
    debug!("Ping received on connection {}", conn.id);

    let pong = ServerMessage::Pong {
        date: Utc::now().to_rfc3339(),
    };
    if !conn.send(&pong).await {
        error!("Failed to send Pong on connection {}", conn.id);
    }
}
