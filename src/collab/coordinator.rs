use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};
use tracing::{debug, info, warn};

use super::{BroadcastRelay, Editor, PresenceTracker, SessionContext};
use crate::models::{ChannelConfig, ChannelEvent, DocumentId, DocumentUpdate, Participant, CONTENT_UPDATE_EVENT};
use crate::realtime::{RealtimeChannel, RealtimeClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No note selected or no identity available.
    Detached,
    /// Channel created, waiting for the subscription to be confirmed.
    Attaching,
    /// Subscribed; presence is tracked and broadcasts flow.
    Attached,
}

/// Inputs of [`SyncCoordinator::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// The editor content changed.
    LocalEdit(String),
    SetDocument(Option<DocumentId>),
    SetSession(Option<SessionContext>),
    Shutdown,
}

struct Attachment<Ch> {
    channel: Ch,
    events: Option<UnboundedReceiver<ChannelEvent>>,
    relay: BroadcastRelay,
    presence: PresenceTracker,
    subscribed: bool,
}

/// Binds the active note to a realtime channel and keeps the editor in
/// sync with the other participants.
pub struct SyncCoordinator<C: RealtimeClient, E: Editor> {
    client: C,
    editor: E,
    session: Option<SessionContext>,
    participant: Option<Participant>,
    document: Option<DocumentId>,
    attachment: Option<Attachment<C::Channel>>,
}

impl<C: RealtimeClient, E: Editor> SyncCoordinator<C, E> {
    pub fn new(client: C, editor: E) -> Self {
        Self {
            client,
            editor,
            session: None,
            participant: None,
            document: None,
            attachment: None,
        }
    }

    pub fn state(&self) -> SyncState {
        match &self.attachment {
            None => SyncState::Detached,
            Some(a) if a.subscribed => SyncState::Attached,
            Some(_) => SyncState::Attaching,
        }
    }

    pub fn document(&self) -> Option<&DocumentId> {
        self.document.as_ref()
    }

    pub fn participant(&self) -> Option<&Participant> {
        self.participant.as_ref()
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut E {
        &mut self.editor
    }

    /// Participants on the active note, the local one included.
    pub fn roster(&self) -> &[Participant] {
        self.attachment
            .as_ref()
            .map(|a| a.presence.roster())
            .unwrap_or_default()
    }

    pub fn others(&self) -> Vec<Participant> {
        self.attachment
            .as_ref()
            .map(|a| a.presence.others().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_broadcast(&self) -> Option<&str> {
        self.attachment.as_ref().and_then(|a| a.relay.last_broadcast())
    }

    /// Switch identity. The presence color is picked once per session.
    pub fn set_session(&mut self, session: Option<SessionContext>) {
        if self.session == session {
            return;
        }
        self.detach();
        self.participant = session.as_ref().map(SessionContext::participant);
        self.session = session;
        self.attach();
    }

    /// Select the active note, tearing down the channel of the previous one.
    pub fn set_document(&mut self, document: Option<DocumentId>) {
        if self.document == document {
            return;
        }
        self.detach();
        self.document = document;
        self.attach();
    }

    fn attach(&mut self) {
        let (Some(document), Some(participant)) = (&self.document, &self.participant) else {
            return;
        };
        let config = ChannelConfig {
            broadcast_self: false,
            presence_key: Some(participant.id.clone()),
        };
        let mut channel = self.client.channel(&document.topic(), config);
        let events = channel.subscribe();
        info!("Attaching {} to {}", participant.id, channel.topic());

        self.attachment = Some(Attachment {
            channel,
            events: Some(events),
            relay: BroadcastRelay::new(document.clone(), participant.id.clone()),
            presence: PresenceTracker::new(participant.clone()),
            subscribed: false,
        });
    }

    /// Leave presence, unsubscribe and discard the last-broadcast marker.
    pub fn detach(&mut self) {
        if let Some(mut attachment) = self.attachment.take() {
            attachment.presence.leave(&attachment.channel);
            attachment.channel.unsubscribe();
            info!("Detached from {}", attachment.channel.topic());
        }
    }

    /// Local edit path. Dropped unless attached; never blocks.
    pub fn send_update(&mut self, content: &str) {
        let Some(attachment) = self.attachment.as_mut().filter(|a| a.subscribed) else {
            return;
        };
        let Some(update) = attachment.relay.broadcast(content) else {
            return;
        };
        match serde_json::to_value(&update) {
            Ok(payload) => attachment.channel.send(CONTENT_UPDATE_EVENT, payload),
            Err(e) => warn!("Failed to encode update for {}: {}", update.document_id, e),
        }
    }

    pub fn handle_event(&mut self, event: ChannelEvent) {
        let Some(attachment) = self.attachment.as_mut() else {
            return;
        };
        match event {
            ChannelEvent::Subscribed => {
                if !attachment.subscribed {
                    attachment.subscribed = true;
                    attachment.presence.join(&attachment.channel);
                    info!("Attached to {}", attachment.channel.topic());
                }
            }
            ChannelEvent::Closed { reason } => {
                debug!("Channel {} closed: {}", attachment.channel.topic(), reason);
                attachment.subscribed = false;
                attachment.presence.reset();
            }
            ChannelEvent::PresenceSync
            | ChannelEvent::PresenceJoin { .. }
            | ChannelEvent::PresenceLeave { .. } => {
                let state = attachment.channel.presence_state();
                attachment.presence.sync(&state);
            }
            ChannelEvent::Broadcast { event, payload } => {
                if event != CONTENT_UPDATE_EVENT {
                    return;
                }
                match serde_json::from_value::<DocumentUpdate>(payload) {
                    Ok(update) => {
                        attachment.relay.on_remote_update(&update, &mut self.editor);
                    }
                    Err(e) => debug!("Discarding malformed update: {}", e),
                }
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            // A change event that no longer matches the editor was overtaken
            // by a later remote update and is stale.
            Command::LocalEdit(content) if content != self.editor.content() => {
                debug!("Dropping stale local edit");
            }
            Command::LocalEdit(content) => self.send_update(&content),
            Command::SetDocument(document) => self.set_document(document),
            Command::SetSession(session) => self.set_session(session),
            Command::Shutdown => self.detach(),
        }
    }

    /// Handle every channel event already queued. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.try_next_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    fn try_next_event(&mut self) -> Option<ChannelEvent> {
        let attachment = self.attachment.as_mut()?;
        let events = attachment.events.as_mut()?;
        match events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                attachment.events = None;
                Some(ChannelEvent::Closed {
                    reason: "event stream ended".to_string(),
                })
            }
        }
    }

    /// Wait for the next channel event. Pending forever while detached.
    pub async fn next_event(&mut self) -> ChannelEvent {
        let next = match self.attachment.as_mut().and_then(|a| a.events.as_mut()) {
            Some(events) => events.recv().await,
            None => std::future::pending().await,
        };
        match next {
            Some(event) => event,
            None => {
                if let Some(attachment) = self.attachment.as_mut() {
                    attachment.events = None;
                }
                ChannelEvent::Closed {
                    reason: "event stream ended".to_string(),
                }
            }
        }
    }

    /// Drive the coordinator from `commands` and channel events until
    /// `Shutdown` or until every command sender is gone.
    pub async fn run(mut self, mut commands: UnboundedReceiver<Command>) -> Self {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = self.next_event() => self.handle_event(event),
            }
        }
        self.detach();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryEditor;
    use crate::realtime::RealtimeHub;
    use tokio::time::{timeout, Duration};

    type Coordinator = SyncCoordinator<RealtimeHub, MemoryEditor>;

    fn coordinator(hub: &RealtimeHub, user: &str, content: &str) -> Coordinator {
        let mut c = SyncCoordinator::new(hub.clone(), MemoryEditor::new(content));
        c.set_session(Some(SessionContext::new(user).with_email(format!("{user}@example.com"))));
        c
    }

    fn settle(coordinators: &mut [&mut Coordinator]) {
        loop {
            let handled: usize = coordinators.iter_mut().map(|c| c.process_pending()).sum();
            if handled == 0 {
                break;
            }
        }
    }

    fn roster_ids(c: &Coordinator) -> Vec<String> {
        c.roster().iter().map(|p| p.id.clone()).collect()
    }

    /// Type into the coordinator's editor and forward the change event.
    fn type_text(c: &mut Coordinator, content: &str) {
        c.editor().type_text(content);
        c.send_update(content);
    }

    #[test]
    fn stays_detached_without_document_or_session() {
        let hub = RealtimeHub::new();
        let mut c = SyncCoordinator::new(hub.clone(), MemoryEditor::default());
        c.set_document(Some("doc-1".into()));
        assert_eq!(c.state(), SyncState::Detached);

        let mut c = SyncCoordinator::new(hub.clone(), MemoryEditor::default());
        c.set_session(Some(SessionContext::new("p1")));
        assert_eq!(c.state(), SyncState::Detached);
        assert_eq!(hub.stats().n_subscribers, 0);
    }

    #[test]
    fn attaches_after_subscription_is_confirmed() {
        let hub = RealtimeHub::new();
        let mut c = coordinator(&hub, "p1", "");
        c.set_document(Some("doc-1".into()));
        assert_eq!(c.state(), SyncState::Attaching);
        assert!(c.roster().is_empty());

        c.process_pending();
        assert_eq!(c.state(), SyncState::Attached);
        assert_eq!(roster_ids(&c), vec!["p1"]);
        assert_eq!(c.roster()[0].display_name.as_deref(), Some("p1"));
    }

    #[test]
    fn edits_before_attached_are_dropped() {
        let hub = RealtimeHub::new();
        let mut p2 = coordinator(&hub, "p2", "");
        p2.set_document(Some("doc-1".into()));
        settle(&mut [&mut p2]);

        let mut p1 = coordinator(&hub, "p1", "");
        p1.set_document(Some("doc-1".into()));
        type_text(&mut p1, "early");
        assert_eq!(p1.last_broadcast(), None);

        settle(&mut [&mut p1, &mut p2]);
        assert_eq!(p2.editor().content(), "");
    }

    #[test]
    fn two_participants_share_an_edit() {
        let hub = RealtimeHub::new();
        let mut p1 = coordinator(&hub, "p1", "<p>Hello</p>");
        let mut p2 = coordinator(&hub, "p2", "<p>Hello</p>");
        p1.set_document(Some("doc-1".into()));
        p2.set_document(Some("doc-1".into()));
        settle(&mut [&mut p1, &mut p2]);

        assert_eq!(roster_ids(&p1), vec!["p1", "p2"]);
        assert_eq!(roster_ids(&p2), vec!["p1", "p2"]);

        type_text(&mut p1, "<p>Hello World</p>");
        settle(&mut [&mut p1, &mut p2]);

        assert_eq!(p2.editor().content(), "<p>Hello World</p>");
        assert_eq!(p2.editor().set_content_calls(), 1);
        assert_eq!(p2.last_broadcast(), Some("<p>Hello World</p>"));
        assert_eq!(p1.editor().set_content_calls(), 0);
    }

    #[test]
    fn repeated_content_is_sent_once() {
        let hub = RealtimeHub::new();
        let mut p1 = coordinator(&hub, "p1", "");
        let mut p2 = coordinator(&hub, "p2", "");
        p1.set_document(Some("doc-1".into()));
        p2.set_document(Some("doc-1".into()));
        settle(&mut [&mut p1, &mut p2]);

        let mut observer = hub.channel("note:doc-1", ChannelConfig::default());
        let mut observer_rx = observer.subscribe();
        while observer_rx.try_recv().is_ok() {}

        p1.send_update("X");
        p1.send_update("X");

        let mut sent = 0;
        while let Ok(event) = observer_rx.try_recv() {
            if matches!(event, ChannelEvent::Broadcast { .. }) {
                sent += 1;
            }
        }
        assert_eq!(sent, 1);
    }

    #[test]
    fn switching_documents_moves_presence() {
        let hub = RealtimeHub::new();
        let mut p1 = coordinator(&hub, "p1", "");
        let mut p2 = coordinator(&hub, "p2", "");
        p1.set_document(Some("doc-1".into()));
        p2.set_document(Some("doc-1".into()));
        settle(&mut [&mut p1, &mut p2]);
        assert_eq!(roster_ids(&p2), vec!["p1", "p2"]);

        p1.set_document(Some("doc-2".into()));
        assert!(!hub.presence_state("note:doc-1").contains_key("p1"));
        assert_eq!(p1.last_broadcast(), None);
        settle(&mut [&mut p1, &mut p2]);

        assert_eq!(roster_ids(&p2), vec!["p2"]);
        assert_eq!(roster_ids(&p1), vec!["p1"]);
        assert!(hub.presence_state("note:doc-2").contains_key("p1"));
        assert_eq!(hub.stats().n_topics, 2);
    }

    #[test]
    fn updates_for_the_old_document_are_not_applied() {
        let hub = RealtimeHub::new();
        let mut p1 = coordinator(&hub, "p1", "a");
        let mut p2 = coordinator(&hub, "p2", "a");
        p1.set_document(Some("doc-1".into()));
        p2.set_document(Some("doc-1".into()));
        settle(&mut [&mut p1, &mut p2]);

        p2.set_document(Some("doc-2".into()));
        type_text(&mut p1, "only for doc-1");
        settle(&mut [&mut p1, &mut p2]);
        assert_eq!(p2.editor().content(), "a");

        // Forged update naming another note on the same topic.
        p2.handle_event(ChannelEvent::Broadcast {
            event: CONTENT_UPDATE_EVENT.to_string(),
            payload: serde_json::json!({
                "document_id": "doc-1",
                "sender_id": "p1",
                "content": "forged",
            }),
        });
        assert_eq!(p2.editor().content(), "a");
    }

    #[test]
    fn closed_channel_goes_back_to_attaching() {
        let hub = RealtimeHub::new();
        let mut p1 = coordinator(&hub, "p1", "");
        p1.set_document(Some("doc-1".into()));
        settle(&mut [&mut p1]);

        p1.handle_event(ChannelEvent::Closed {
            reason: "test".to_string(),
        });
        assert_eq!(p1.state(), SyncState::Attaching);
        assert!(p1.roster().is_empty());

        p1.send_update("ignored");
        assert_eq!(p1.last_broadcast(), None);
    }

    #[test]
    fn color_is_stable_across_documents() {
        let hub = RealtimeHub::new();
        let mut p1 = coordinator(&hub, "p1", "");
        let color = p1.participant().map(|p| p.color.clone());
        p1.set_document(Some("doc-1".into()));
        p1.set_document(Some("doc-2".into()));
        assert_eq!(p1.participant().map(|p| p.color.clone()), color);
    }

    #[test]
    fn clearing_document_detaches() {
        let hub = RealtimeHub::new();
        let mut p1 = coordinator(&hub, "p1", "");
        p1.set_document(Some("doc-1".into()));
        settle(&mut [&mut p1]);

        p1.set_document(None);
        assert_eq!(p1.state(), SyncState::Detached);
        assert_eq!(hub.stats().n_subscribers, 0);
    }

    #[test]
    fn overtaken_change_events_are_not_rebroadcast() {
        let hub = RealtimeHub::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut p2 = SyncCoordinator::new(hub.clone(), MemoryEditor::new("X").with_listener(tx));
        p2.set_session(Some(SessionContext::new("p2")));
        p2.set_document(Some("doc-1".into()));
        settle(&mut [&mut p2]);

        let mut observer = hub.channel("note:doc-1", ChannelConfig::default());
        let mut observer_rx = observer.subscribe();

        for content in ["Y", "Z"] {
            let update = DocumentUpdate {
                document_id: "doc-1".into(),
                sender_id: "p1".to_string(),
                content: content.to_string(),
            };
            p2.handle_event(ChannelEvent::Broadcast {
                event: CONTENT_UPDATE_EVENT.to_string(),
                payload: serde_json::to_value(&update).unwrap(),
            });
        }
        assert_eq!(p2.editor().content(), "Z");

        // Both change events raised by applying the updates arrive late.
        let mut queued = 0;
        while let Ok(command) = rx.try_recv() {
            p2.handle_command(command);
            queued += 1;
        }
        assert_eq!(queued, 2);

        let mut sent = Vec::new();
        while let Ok(event) = observer_rx.try_recv() {
            if let ChannelEvent::Broadcast { payload, .. } = event {
                sent.push(payload["content"].as_str().unwrap_or_default().to_string());
            }
        }
        assert!(sent.is_empty(), "re-sent applied content: {sent:?}");
        assert_eq!(p2.last_broadcast(), Some("Z"));
    }

    async fn wait_until(check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn run_loop_does_not_echo_applied_content() {
        let hub = RealtimeHub::new();

        let (tx1, rx1) = tokio::sync::mpsc::unbounded_channel();
        let editor1 = MemoryEditor::new("<p>Hello</p>").with_listener(tx1.clone());
        let mut p1 = SyncCoordinator::new(hub.clone(), editor1.clone());
        p1.set_session(Some(SessionContext::new("p1")));
        p1.set_document(Some("doc-1".into()));

        let (tx2, rx2) = tokio::sync::mpsc::unbounded_channel();
        let editor2 = MemoryEditor::new("<p>Hello</p>").with_listener(tx2.clone());
        let mut p2 = SyncCoordinator::new(hub.clone(), editor2.clone());
        p2.set_session(Some(SessionContext::new("p2")));
        p2.set_document(Some("doc-1".into()));

        let run1 = tokio::spawn(p1.run(rx1));
        let run2 = tokio::spawn(p2.run(rx2));
        wait_until(|| hub.presence_state("note:doc-1").len() == 2).await;

        let mut observer = hub.channel("note:doc-1", ChannelConfig::default());
        let mut observer_rx = observer.subscribe();
        while observer_rx.try_recv().is_ok() {}

        editor1.type_text("<p>Hello World</p>");
        wait_until(|| editor2.content() == "<p>Hello World</p>").await;

        // Commands are handled in order, so once p2's own edit goes out the
        // change event raised by applying p1's update has been handled too.
        editor2.type_text("<p>Hello World!</p>");
        let mut contents = Vec::new();
        while contents.last().map(String::as_str) != Some("<p>Hello World!</p>") {
            let event = timeout(Duration::from_secs(2), observer_rx.recv())
                .await
                .expect("timed out waiting for a broadcast")
                .expect("observer channel closed");
            if let ChannelEvent::Broadcast { payload, .. } = event {
                let update: DocumentUpdate = serde_json::from_value(payload).unwrap();
                contents.push(update.content);
            }
        }
        assert_eq!(contents, vec!["<p>Hello World</p>", "<p>Hello World!</p>"]);
        wait_until(|| editor1.content() == "<p>Hello World!</p>").await;
        assert_eq!(editor1.set_content_calls(), 1);
        assert_eq!(editor2.set_content_calls(), 1);

        tx1.send(Command::Shutdown).unwrap();
        tx2.send(Command::Shutdown).unwrap();
        let p1 = run1.await.unwrap();
        let p2 = run2.await.unwrap();
        assert_eq!(p1.state(), SyncState::Detached);
        assert_eq!(p2.state(), SyncState::Detached);
        while let Ok(event) = observer_rx.try_recv() {
            assert!(!matches!(event, ChannelEvent::Broadcast { .. }), "echoed: {event:?}");
        }
        drop(observer);
        assert_eq!(hub.stats(), crate::realtime::HubStats::default());
    }
}
