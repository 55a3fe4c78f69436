use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::{RealtimeChannel, RealtimeClient};
use crate::models::{ChannelConfig, ChannelEvent, PresenceState};

/// In-process realtime hub.
///
/// Cloning is cheap; every clone addresses the same set of topics. The
/// websocket server exposes one hub to remote clients, and in-process
/// clients use it directly through [`HubChannel`].
#[derive(Clone, Default)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    topics: Mutex<HashMap<String, Topic>>,
    next_id: AtomicU64,
}

#[derive(Default)]
struct Topic {
    // Keyed by subscription id, so iteration follows subscription order.
    subscribers: BTreeMap<u64, Subscriber>,
}

struct Subscriber {
    tx: UnboundedSender<ChannelEvent>,
    broadcast_self: bool,
    presence_key: String,
    presence: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub n_topics: usize,
    pub n_subscribers: usize,
    pub n_presences: usize,
}

impl Topic {
    fn presence_state(&self) -> PresenceState {
        let mut state = PresenceState::new();
        for sub in self.subscribers.values() {
            if let Some(payload) = &sub.presence {
                state
                    .entry(sub.presence_key.clone())
                    .or_default()
                    .push(payload.clone());
            }
        }
        state
    }

    fn notify_all(&self, event: &ChannelEvent) {
        for (id, sub) in &self.subscribers {
            if sub.tx.send(event.clone()).is_err() {
                trace!("Subscriber {} is gone, dropping event", id);
            }
        }
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber on `topic` and return its subscription id.
    ///
    /// The subscriber immediately receives `Subscribed` followed by a
    /// `PresenceSync` for the current state of the topic.
    pub fn register(&self, topic: &str, config: &ChannelConfig, tx: UnboundedSender<ChannelEvent>) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let presence_key = config
            .presence_key
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let _ = tx.send(ChannelEvent::Subscribed);
        let _ = tx.send(ChannelEvent::PresenceSync);

        let mut topics = self.topics();
        topics.entry(topic.to_string()).or_default().subscribers.insert(
            id,
            Subscriber {
                tx,
                broadcast_self: config.broadcast_self,
                presence_key,
                presence: None,
            },
        );
        debug!("Subscriber {} joined topic {}", id, topic);
        id
    }

    /// Remove a subscriber. Its presence, if any, leaves the topic.
    pub fn unregister(&self, topic: &str, id: u64) {
        let mut topics = self.topics();
        let Some(entry) = topics.get_mut(topic) else {
            return;
        };
        let Some(sub) = entry.subscribers.remove(&id) else {
            return;
        };
        debug!("Subscriber {} left topic {}", id, topic);

        if let Some(payload) = sub.presence {
            entry.notify_all(&ChannelEvent::PresenceLeave {
                key: sub.presence_key,
                left_presences: vec![payload],
            });
            entry.notify_all(&ChannelEvent::PresenceSync);
        }

        if entry.subscribers.is_empty() {
            topics.remove(topic);
            info!("Topic {} closed", topic);
        }
    }

    /// Set the presence payload of a subscriber, replacing any previous one.
    pub fn track(&self, topic: &str, id: u64, payload: Value) {
        let mut topics = self.topics();
        let Some(entry) = topics.get_mut(topic) else {
            return;
        };
        let Some(sub) = entry.subscribers.get_mut(&id) else {
            return;
        };
        let key = sub.presence_key.clone();
        let previous = sub.presence.replace(payload.clone());

        if let Some(old) = previous {
            entry.notify_all(&ChannelEvent::PresenceLeave {
                key: key.clone(),
                left_presences: vec![old],
            });
        }
        entry.notify_all(&ChannelEvent::PresenceJoin {
            key,
            new_presences: vec![payload],
        });
        entry.notify_all(&ChannelEvent::PresenceSync);
    }

    pub fn untrack(&self, topic: &str, id: u64) {
        let mut topics = self.topics();
        let Some(entry) = topics.get_mut(topic) else {
            return;
        };
        let Some(sub) = entry.subscribers.get_mut(&id) else {
            return;
        };
        let key = sub.presence_key.clone();
        if let Some(old) = sub.presence.take() {
            entry.notify_all(&ChannelEvent::PresenceLeave {
                key,
                left_presences: vec![old],
            });
            entry.notify_all(&ChannelEvent::PresenceSync);
        }
    }

    /// Fan a broadcast out to the topic and return how many subscribers it reached.
    ///
    /// The sender only receives its own message when it subscribed with
    /// `broadcast_self`. Broadcasts from unknown subscriptions are dropped.
    pub fn broadcast(&self, topic: &str, id: u64, event: &str, payload: Value) -> usize {
        let topics = self.topics();
        let Some(entry) = topics.get(topic) else {
            return 0;
        };
        let Some(sender) = entry.subscribers.get(&id) else {
            trace!("Dropping broadcast from unsubscribed sender {} on {}", id, topic);
            return 0;
        };
        let echo = sender.broadcast_self;

        let msg = ChannelEvent::Broadcast {
            event: event.to_string(),
            payload,
        };
        let mut delivered = 0;
        for (sub_id, sub) in &entry.subscribers {
            if *sub_id == id && !echo {
                continue;
            }
            if sub.tx.send(msg.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn presence_state(&self, topic: &str) -> PresenceState {
        self.topics()
            .get(topic)
            .map(Topic::presence_state)
            .unwrap_or_default()
    }

    pub fn stats(&self) -> HubStats {
        let topics = self.topics();
        let mut stats = HubStats {
            n_topics: topics.len(),
            ..HubStats::default()
        };
        for entry in topics.values() {
            stats.n_subscribers += entry.subscribers.len();
            stats.n_presences += entry
                .subscribers
                .values()
                .filter(|s| s.presence.is_some())
                .count();
        }
        stats
    }
}

impl RealtimeClient for RealtimeHub {
    type Channel = HubChannel;

    fn channel(&self, topic: &str, config: ChannelConfig) -> HubChannel {
        HubChannel {
            hub: self.clone(),
            topic: topic.to_string(),
            config,
            id: None,
        }
    }
}

/// Channel handle onto a [`RealtimeHub`] topic. Dropping it unsubscribes.
pub struct HubChannel {
    hub: RealtimeHub,
    topic: String,
    config: ChannelConfig,
    id: Option<u64>,
}

impl RealtimeChannel for HubChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn subscribe(&mut self) -> UnboundedReceiver<ChannelEvent> {
        self.unsubscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        self.id = Some(self.hub.register(&self.topic, &self.config, tx));
        rx
    }

    fn track(&self, payload: Value) {
        if let Some(id) = self.id {
            self.hub.track(&self.topic, id, payload);
        }
    }

    fn untrack(&self) {
        if let Some(id) = self.id {
            self.hub.untrack(&self.topic, id);
        }
    }

    fn presence_state(&self) -> PresenceState {
        self.hub.presence_state(&self.topic)
    }

    fn send(&self, event: &str, payload: Value) {
        if let Some(id) = self.id {
            self.hub.broadcast(&self.topic, id, event, payload);
        }
    }

    fn unsubscribe(&mut self) {
        if let Some(id) = self.id.take() {
            self.hub.unregister(&self.topic, id);
        }
    }
}

impl Drop for HubChannel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
