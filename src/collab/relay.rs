use tracing::{debug, trace};

use super::Editor;
use crate::models::{DocumentId, DocumentUpdate};

/// Exchanges full content snapshots for one note without echo.
///
/// Remote content replaces the whole local document; concurrent edits
/// resolve last-writer-wins and the local cursor is not preserved.
pub struct BroadcastRelay {
    document_id: DocumentId,
    sender_id: String,
    last_broadcast: Option<String>,
}

impl BroadcastRelay {
    pub fn new(document_id: DocumentId, sender_id: impl Into<String>) -> Self {
        Self {
            document_id,
            sender_id: sender_id.into(),
            last_broadcast: None,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Content most recently sent or applied.
    pub fn last_broadcast(&self) -> Option<&str> {
        self.last_broadcast.as_deref()
    }

    /// Prepare a local edit for sending. Returns `None` when `content` is
    /// what was last sent or applied.
    pub fn broadcast(&mut self, content: &str) -> Option<DocumentUpdate> {
        if self.last_broadcast.as_deref() == Some(content) {
            trace!("Content unchanged for {}, not broadcasting", self.document_id);
            return None;
        }
        self.last_broadcast = Some(content.to_string());
        Some(DocumentUpdate {
            document_id: self.document_id.clone(),
            sender_id: self.sender_id.clone(),
            content: content.to_string(),
        })
    }

    /// Apply a snapshot received from another participant.
    /// Returns whether the editor content was replaced.
    pub fn on_remote_update<E: Editor>(&mut self, update: &DocumentUpdate, editor: &mut E) -> bool {
        if update.document_id != self.document_id {
            trace!("Ignoring update for {} while editing {}", update.document_id, self.document_id);
            return false;
        }
        if update.sender_id == self.sender_id {
            trace!("Ignoring own update on {}", self.document_id);
            return false;
        }
        if self.last_broadcast.as_deref() == Some(update.content.as_str()) {
            return false;
        }
        if editor.content() == update.content {
            return false;
        }

        // The marker must be set first: the editor reports the replacement
        // as a change, which then matches the marker and is not re-sent.
        self.last_broadcast = Some(update.content.clone());
        editor.set_content(&update.content);
        debug!("Applied update from {} on {}", update.sender_id, self.document_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryEditor;

    fn update(doc: &str, sender: &str, content: &str) -> DocumentUpdate {
        DocumentUpdate {
            document_id: doc.into(),
            sender_id: sender.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn repeated_broadcast_is_sent_once() {
        let mut relay = BroadcastRelay::new("doc-1".into(), "p1");
        assert!(relay.broadcast("<p>x</p>").is_some());
        assert!(relay.broadcast("<p>x</p>").is_none());
        assert!(relay.broadcast("<p>xy</p>").is_some());
    }

    #[test]
    fn broadcast_is_tagged_with_document_and_sender() {
        let mut relay = BroadcastRelay::new("doc-1".into(), "p1");
        let sent = relay.broadcast("<p>Hello World</p>").unwrap();
        assert_eq!(sent, update("doc-1", "p1", "<p>Hello World</p>"));
        assert_eq!(relay.last_broadcast(), Some("<p>Hello World</p>"));
    }

    #[test]
    fn remote_update_replaces_editor_once() {
        let mut relay = BroadcastRelay::new("doc-1".into(), "p2");
        let mut editor = MemoryEditor::new("<p>Hello</p>");

        assert!(relay.on_remote_update(&update("doc-1", "p1", "<p>Y</p>"), &mut editor));
        assert!(!relay.on_remote_update(&update("doc-1", "p1", "<p>Y</p>"), &mut editor));

        assert_eq!(editor.content(), "<p>Y</p>");
        assert_eq!(editor.set_content_calls(), 1);
        assert_eq!(relay.last_broadcast(), Some("<p>Y</p>"));
    }

    #[test]
    fn foreign_document_and_self_are_ignored() {
        let mut relay = BroadcastRelay::new("doc-1".into(), "p2");
        let mut editor = MemoryEditor::new("a");

        assert!(!relay.on_remote_update(&update("doc-2", "p1", "b"), &mut editor));
        assert!(!relay.on_remote_update(&update("doc-1", "p2", "b"), &mut editor));
        assert_eq!(editor.content(), "a");
        assert_eq!(relay.last_broadcast(), None);
    }

    #[test]
    fn content_equal_to_editor_is_a_no_op() {
        let mut relay = BroadcastRelay::new("doc-1".into(), "p2");
        let mut editor = MemoryEditor::new("same");
        assert!(!relay.on_remote_update(&update("doc-1", "p1", "same"), &mut editor));
        assert_eq!(editor.set_content_calls(), 0);
    }

    #[test]
    fn applied_content_is_not_rebroadcast() {
        let mut relay = BroadcastRelay::new("doc-1".into(), "p2");
        let mut editor = MemoryEditor::new("a");
        relay.on_remote_update(&update("doc-1", "p1", "b"), &mut editor);
        // The editor's change event for the replacement.
        assert!(relay.broadcast(&editor.content()).is_none());
    }
}
