use serde::{Deserialize, Serialize};
use std::fmt;

/// Broadcast event name carrying a [`DocumentUpdate`].
pub const CONTENT_UPDATE_EVENT: &str = "content-update";

/// Opaque, stable identifier of a shared note.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the realtime topic shared by everyone editing this note.
    pub fn topic(&self) -> String {
        format!("note:{}", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Full content snapshot sent to the other editors of a note.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpdate {
    pub document_id: DocumentId,
    pub sender_id: String,
    pub content: String,
}
