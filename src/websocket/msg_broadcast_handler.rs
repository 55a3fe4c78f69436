use serde_json::Value;
use tracing::debug;

use super::connection::Connection;

/// Handle BroadcastMessage
pub async fn handle_broadcast_message(conn: &Connection, topic: &str, event: &str, payload: Value) {
    let Some(id) = conn.subscription(topic) else {
        conn.send_error(Some(topic), "Not subscribed").await;
        return;
    };
    let delivered = conn.hub().broadcast(topic, id, event, payload);
    debug!("Broadcast '{}' on {} reached {} subscribers", event, topic, delivered);
}
