use std::collections::HashSet;
use tracing::{debug, warn};

use crate::models::{Participant, PresenceState};
use crate::realtime::RealtimeChannel;

/// Roster of the participants viewing one note.
pub struct PresenceTracker {
    local: Participant,
    roster: Vec<Participant>,
    joined: bool,
}

impl PresenceTracker {
    pub fn new(local: Participant) -> Self {
        Self {
            local,
            roster: Vec::new(),
            joined: false,
        }
    }

    /// Announce the local participant on a subscribed channel.
    pub fn join<C: RealtimeChannel>(&mut self, channel: &C) {
        match serde_json::to_value(&self.local) {
            Ok(payload) => {
                channel.track(payload);
                self.joined = true;
                debug!("Tracking {} on {}", self.local.id, channel.topic());
            }
            Err(e) => warn!("Failed to encode presence for {}: {}", self.local.id, e),
        }
    }

    /// Rebuild the roster from the channel's authoritative state.
    pub fn sync(&mut self, state: &PresenceState) {
        self.roster = roster_from_state(state);
    }

    /// Stop advertising presence and forget the roster.
    pub fn leave<C: RealtimeChannel>(&mut self, channel: &C) {
        if self.joined {
            channel.untrack();
        }
        self.reset();
    }

    /// Forget the roster without touching the channel.
    pub fn reset(&mut self) {
        self.roster.clear();
        self.joined = false;
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn local(&self) -> &Participant {
        &self.local
    }

    /// Everyone present, the local participant included.
    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn others(&self) -> impl Iterator<Item = &Participant> + '_ {
        self.roster.iter().filter(move |p| p.id != self.local.id)
    }
}

/// Flatten a presence state into participants, ordered by presence key.
/// Unreadable payloads are skipped and each participant id is listed once.
pub fn roster_from_state(state: &PresenceState) -> Vec<Participant> {
    let mut seen = HashSet::new();
    let mut roster = Vec::new();
    for (key, metas) in state {
        for meta in metas {
            match serde_json::from_value::<Participant>(meta.clone()) {
                Ok(p) => {
                    if seen.insert(p.id.clone()) {
                        roster.push(p);
                    }
                }
                Err(e) => debug!("Skipping presence under {}: {}", key, e),
            }
        }
    }
    roster
}
