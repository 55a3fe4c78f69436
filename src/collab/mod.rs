//! Realtime collaborative note editing.
//!
//! The [`SyncCoordinator`] binds one note to one realtime channel, keeps a
//! presence roster through the [`PresenceTracker`] and exchanges full
//! content snapshots through the [`BroadcastRelay`]. Collaboration is
//! strictly additive: none of it can block or fail local editing.

pub mod coordinator;
pub mod editor;
pub mod presence;
pub mod relay;
pub mod session;

pub use coordinator::{Command, SyncCoordinator, SyncState};
pub use editor::{Editor, MemoryEditor};
pub use presence::PresenceTracker;
pub use relay::BroadcastRelay;
pub use session::SessionContext;
