use serde_json::Value;
use tracing::debug;

use super::connection::Connection;

/// Handle TrackMessage
pub async fn handle_track_message(conn: &Connection, topic: &str, payload: Value) {
    match conn.subscription(topic) {
        Some(id) => {
            debug!("Connection {} tracking presence on {}", conn.id, topic);
            conn.hub().track(topic, id, payload);
        }
        None => conn.send_error(Some(topic), "Not subscribed").await,
    }
}

/// Handle UntrackMessage
pub async fn handle_untrack_message(conn: &Connection, topic: &str) {
    match conn.subscription(topic) {
        Some(id) => conn.hub().untrack(topic, id),
        None => conn.send_error(Some(topic), "Not subscribed").await,
    }
}
