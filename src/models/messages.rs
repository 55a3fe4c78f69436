use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ChannelConfig, ChannelEvent, PresenceState};

/// Frames a client sends over the realtime websocket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        topic: String,
        #[serde(default)]
        config: ChannelConfig,
    },
    Track {
        topic: String,
        payload: Value,
    },
    Untrack {
        topic: String,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: Value,
    },
    Unsubscribe {
        topic: String,
    },
    Ping,
}

/// Frames the server sends over the realtime websocket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Event {
        topic: String,
        event: ChannelEvent,
    },
    PresenceState {
        topic: String,
        state: PresenceState,
    },
    Pong {
        date: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        message: String,
    },
}
