use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::{RealtimeChannel, RealtimeClient};
use crate::models::{ChannelConfig, ChannelEvent, ClientMessage, PresenceState, ServerMessage};

#[derive(Debug)]
pub enum RealtimeError {
    Connect(tokio_tungstenite::tungstenite::Error),
    InvalidToken,
}

impl fmt::Display for RealtimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealtimeError::Connect(e) => write!(f, "Realtime connection failed: {}", e),
            RealtimeError::InvalidToken => write!(f, "Auth token is not a valid header value"),
        }
    }
}

impl std::error::Error for RealtimeError {}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        RealtimeError::Connect(e)
    }
}

/// Websocket client for a realtime hub served by this crate.
///
/// One connection multiplexes every topic; at most one channel per topic
/// is routed at a time.
#[derive(Clone)]
pub struct RemoteRealtime {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    outbound: UnboundedSender<ClientMessage>,
    routes: Mutex<HashMap<String, Route>>,
}

struct Route {
    tx: UnboundedSender<ChannelEvent>,
    presence: PresenceState,
}

impl RemoteInner {
    fn routes(&self) -> MutexGuard<'_, HashMap<String, Route>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, msg: ClientMessage) {
        if self.outbound.send(msg).is_err() {
            debug!("Realtime connection is closed, dropping outbound frame");
        }
    }

    fn dispatch(&self, msg: ServerMessage) {
        match msg {
            ServerMessage::Event { topic, event } => {
                if let Some(route) = self.routes().get(&topic) {
                    let _ = route.tx.send(event);
                }
            }
            ServerMessage::PresenceState { topic, state } => {
                if let Some(route) = self.routes().get_mut(&topic) {
                    route.presence = state;
                }
            }
            ServerMessage::Pong { date } => {
                debug!("Pong received ({})", date);
            }
            ServerMessage::Error { topic, message } => {
                warn!("Realtime server error on {:?}: {}", topic, message);
            }
        }
    }

    fn close_all(&self, reason: &str) {
        for (topic, route) in self.routes().drain() {
            debug!("Closing route for {}", topic);
            let _ = route.tx.send(ChannelEvent::Closed {
                reason: reason.to_string(),
            });
        }
    }
}

impl RemoteRealtime {
    /// Connect to `url` (e.g. `ws://host:3000/realtime/v1/websocket`),
    /// optionally presenting a bearer token.
    pub async fn connect(url: &str, token: Option<&str>) -> Result<Self, RealtimeError> {
        let mut request = url.into_client_request()?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RealtimeError::InvalidToken)?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        info!("Connected to realtime hub at {}", url);
        let (mut sink, mut stream) = ws.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let inner = Arc::new(RemoteInner {
            outbound,
            routes: Mutex::new(HashMap::new()),
        });

        // Writer: ends once every handle (and thus the outbound sender) is gone.
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode realtime frame: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let weak: Weak<RemoteInner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!("Realtime connection error: {}", e);
                        break;
                    }
                };
                let msg: ServerMessage = match serde_json::from_str(text.as_str()) {
                    Ok(msg) => msg,
                    Err(e) => {
                        error!("Failed to parse realtime frame: {}", e);
                        continue;
                    }
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.dispatch(msg);
            }
            if let Some(inner) = weak.upgrade() {
                inner.close_all("connection closed");
            }
            info!("Realtime connection terminated");
        });

        Ok(Self { inner })
    }

    pub fn ping(&self) {
        self.inner.push(ClientMessage::Ping);
    }
}

impl RealtimeClient for RemoteRealtime {
    type Channel = RemoteChannel;

    fn channel(&self, topic: &str, config: ChannelConfig) -> RemoteChannel {
        RemoteChannel {
            client: self.clone(),
            topic: topic.to_string(),
            config,
            subscribed: false,
        }
    }
}

/// Channel handle onto a remote topic. Dropping it unsubscribes.
pub struct RemoteChannel {
    client: RemoteRealtime,
    topic: String,
    config: ChannelConfig,
    subscribed: bool,
}

impl RealtimeChannel for RemoteChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn subscribe(&mut self) -> UnboundedReceiver<ChannelEvent> {
        self.unsubscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        self.client.inner.routes().insert(
            self.topic.clone(),
            Route {
                tx,
                presence: PresenceState::new(),
            },
        );
        self.client.inner.push(ClientMessage::Subscribe {
            topic: self.topic.clone(),
            config: self.config.clone(),
        });
        self.subscribed = true;
        rx
    }

    fn track(&self, payload: Value) {
        if self.subscribed {
            self.client.inner.push(ClientMessage::Track {
                topic: self.topic.clone(),
                payload,
            });
        }
    }

    fn untrack(&self) {
        if self.subscribed {
            self.client.inner.push(ClientMessage::Untrack {
                topic: self.topic.clone(),
            });
        }
    }

    fn presence_state(&self) -> PresenceState {
        self.client
            .inner
            .routes()
            .get(&self.topic)
            .map(|route| route.presence.clone())
            .unwrap_or_default()
    }

    fn send(&self, event: &str, payload: Value) {
        if self.subscribed {
            self.client.inner.push(ClientMessage::Broadcast {
                topic: self.topic.clone(),
                event: event.to_string(),
                payload,
            });
        }
    }

    fn unsubscribe(&mut self) {
        if !self.subscribed {
            return;
        }
        self.subscribed = false;
        self.client.inner.routes().remove(&self.topic);
        self.client.inner.push(ClientMessage::Unsubscribe {
            topic: self.topic.clone(),
        });
    }
}

impl Drop for RemoteChannel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
