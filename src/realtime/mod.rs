//! Pub/sub channel primitive consumed by the collaboration layer.
//!
//! A channel is bound to one topic. Subscribing yields a queue of
//! [`ChannelEvent`]s; every other operation is fire-and-forget and never
//! blocks the caller.

pub mod hub;
pub mod remote;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::models::{ChannelConfig, ChannelEvent, PresenceState};

pub use hub::{HubChannel, HubStats, RealtimeHub};
pub use remote::{RealtimeError, RemoteChannel, RemoteRealtime};

/// Factory for topic-bound channels.
pub trait RealtimeClient: Send + Sync {
    type Channel: RealtimeChannel;

    fn channel(&self, topic: &str, config: ChannelConfig) -> Self::Channel;
}

pub trait RealtimeChannel: Send {
    fn topic(&self) -> &str;

    /// Join the topic. `ChannelEvent::Subscribed` is queued once the
    /// subscription is confirmed.
    fn subscribe(&mut self) -> UnboundedReceiver<ChannelEvent>;

    /// Advertise `payload` as this subscriber's presence.
    fn track(&self, payload: Value);

    fn untrack(&self);

    /// Latest authoritative presence state of the topic.
    fn presence_state(&self) -> PresenceState;

    /// Broadcast to the other subscribers. Dropped silently when not subscribed.
    fn send(&self, event: &str, payload: Value);

    fn unsubscribe(&mut self);
}
