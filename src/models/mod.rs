pub mod channel;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod health;
pub mod messages;
pub mod participant;

pub use channel::*;
pub use diagnostics::*;
pub use document::*;
pub use error::*;
pub use health::*;
pub use messages::*;
pub use participant::*;
