pub mod auth;
pub mod collab;
pub mod config;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;

pub use state::AppState;
