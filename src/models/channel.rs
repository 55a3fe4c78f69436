use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Presence payloads currently tracked on a topic, grouped by presence key.
pub type PresenceState = BTreeMap<String, Vec<Value>>;

/// Options a subscriber passes when joining a topic.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Deliver this subscriber's own broadcasts back to it.
    #[serde(default)]
    pub broadcast_self: bool,

    /// Key under which this subscriber's presence is grouped.
    /// A random key is assigned when absent.
    #[serde(default)]
    pub presence_key: Option<String>,
}

/// Events delivered to the subscriber of a channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    Subscribed,
    Closed {
        reason: String,
    },
    PresenceSync,
    PresenceJoin {
        key: String,
        new_presences: Vec<Value>,
    },
    PresenceLeave {
        key: String,
        left_presences: Vec<Value>,
    },
    Broadcast {
        event: String,
        payload: Value,
    },
}
