use tracing::info;

use super::connection::Connection;
use crate::models::ChannelConfig;

/// Handle SubscribeMessage
pub fn handle_subscribe_message(conn: &mut Connection, topic: String, config: ChannelConfig) {
    info!("Connection {} subscribing to {}", conn.id, topic);
    conn.subscribe(topic, &config);
}

/// Handle UnsubscribeMessage
pub fn handle_unsubscribe_message(conn: &mut Connection, topic: &str) {
    if conn.unsubscribe(topic) {
        info!("Connection {} unsubscribed from {}", conn.id, topic);
    }
}
