use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Colors handed out to participants. Collisions between concurrent
/// participants are allowed.
pub const PALETTE: [&str; 7] = [
    "#958DF1", "#F98181", "#FBBC88", "#FAF594", "#70CFF8", "#94FADB", "#B9F18D",
];

/// Presence record advertised by everyone viewing a note.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub display_name: Option<String>,
    pub color: String,
    pub avatar: Option<String>,
}

/// Pick a palette color uniformly at random.
pub fn pick_color() -> &'static str {
    let idx = (Uuid::new_v4().as_u128() % PALETTE.len() as u128) as usize;
    PALETTE[idx]
}
