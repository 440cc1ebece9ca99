pub mod ansi;
pub mod api;
pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod log_view;
pub mod model;
pub mod notify;
pub mod reducer;
pub mod socketio;
pub mod state;
pub mod transport;
pub mod view;
