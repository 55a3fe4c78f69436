use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

use crate::models::{ChannelConfig, ChannelEvent, ServerMessage};
use crate::realtime::RealtimeHub;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Serialize and send a frame. Returns false once the socket is gone.
pub async fn send_message(sender: &WsSender, msg: &ServerMessage) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode server frame: {}", e);
            return true;
        }
    };
    sender.lock().await.send(Message::Text(text)).await.is_ok()
}

/// One websocket client and the hub topics it subscribed to.
pub struct Connection {
    pub id: String,
    hub: RealtimeHub,
    sender: WsSender,
    subscriptions: HashMap<String, u64>,
}

impl Connection {
    pub fn new(id: String, hub: RealtimeHub, sender: WsSender) -> Self {
        Self {
            id,
            hub,
            sender,
            subscriptions: HashMap::new(),
        }
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.hub
    }

    pub async fn send(&self, msg: &ServerMessage) -> bool {
        send_message(&self.sender, msg).await
    }

    pub async fn send_error(&self, topic: Option<&str>, message: impl Into<String>) {
        let msg = ServerMessage::Error {
            topic: topic.map(str::to_string),
            message: message.into(),
        };
        let _ = self.send(&msg).await;
    }

    /// Hub subscription id for `topic`, if subscribed.
    pub fn subscription(&self, topic: &str) -> Option<u64> {
        self.subscriptions.get(topic).copied()
    }

    /// Register on `topic` and start forwarding its events to the socket.
    pub fn subscribe(&mut self, topic: String, config: &ChannelConfig) {
        self.unsubscribe(&topic);

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.hub.register(&topic, config, tx);
        tokio::spawn(forward_events(rx, topic.clone(), self.hub.clone(), self.sender.clone()));
        self.subscriptions.insert(topic, id);
    }

    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        match self.subscriptions.remove(topic) {
            Some(id) => {
                self.hub.unregister(topic, id);
                true
            }
            None => false,
        }
    }

    /// Leave every topic. Presence of this connection disappears everywhere.
    pub fn close(&mut self) {
        for (topic, id) in self.subscriptions.drain() {
            self.hub.unregister(&topic, id);
        }
    }
}

// Ends when the hub drops the subscription or the socket goes away.
async fn forward_events(
    mut rx: mpsc::UnboundedReceiver<ChannelEvent>,
    topic: String,
    hub: RealtimeHub,
    sender: WsSender,
) {
    while let Some(event) = rx.recv().await {
        if event == ChannelEvent::PresenceSync {
            let state = ServerMessage::PresenceState {
                topic: topic.clone(),
                state: hub.presence_state(&topic),
            };
            if !send_message(&sender, &state).await {
                break;
            }
        }
        let msg = ServerMessage::Event {
            topic: topic.clone(),
            event,
        };
        if !send_message(&sender, &msg).await {
            break;
        }
    }
    debug!("Stopped forwarding {}", topic);
}
