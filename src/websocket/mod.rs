pub mod connctx;
pub mod connection;
pub mod handler;
pub mod msg_broadcast_handler;
pub mod msg_ping_handler;
pub mod msg_presence_handler;
pub mod msg_subscribe_handler;

pub use handler::websocket_handler;
