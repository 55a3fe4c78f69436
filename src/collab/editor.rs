use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;

use super::Command;

/// Rich-text editor seen as a black box of full-document snapshots.
pub trait Editor: Send {
    fn content(&self) -> String;

    /// Replace the whole document.
    fn set_content(&mut self, content: &str);
}

/// Plain in-memory editor.
///
/// Clones share the same document. Like a real editor it reports every
/// content change, programmatic ones included, to an optional listener as
/// [`Command::LocalEdit`].
#[derive(Clone, Default)]
pub struct MemoryEditor {
    state: Arc<Mutex<EditorState>>,
}

#[derive(Default)]
struct EditorState {
    content: String,
    set_content_calls: usize,
    listener: Option<UnboundedSender<Command>>,
}

impl MemoryEditor {
    pub fn new(content: impl Into<String>) -> Self {
        let editor = Self::default();
        editor.lock().content = content.into();
        editor
    }

    fn lock(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forward change notifications to `listener`.
    pub fn with_listener(self, listener: UnboundedSender<Command>) -> Self {
        self.lock().listener = Some(listener);
        self
    }

    /// Simulate the user typing until the document reads `content`.
    pub fn type_text(&self, content: &str) {
        let mut state = self.lock();
        state.content = content.to_string();
        notify(&state);
    }

    /// How many times the document was replaced through [`Editor::set_content`].
    pub fn set_content_calls(&self) -> usize {
        self.lock().set_content_calls
    }
}

fn notify(state: &EditorState) {
    if let Some(listener) = &state.listener {
        let _ = listener.send(Command::LocalEdit(state.content.clone()));
    }
}

impl Editor for MemoryEditor {
    fn content(&self) -> String {
        self.lock().content.clone()
    }

    fn set_content(&mut self, content: &str) {
        let mut state = self.lock();
        state.content = content.to_string();
        state.set_content_calls += 1;
        notify(&state);
    }
}
