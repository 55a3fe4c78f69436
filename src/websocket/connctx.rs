use chrono::{DateTime, Utc};

/// What the server knows about an open realtime connection.
#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub uid: Option<String>,
    pub display_name: Option<String>,
    pub connected_at: DateTime<Utc>,
}
