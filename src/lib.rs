//! Skyduel server - authoritative two-player helicopter duels
//!
//! Players pair up through short room codes. The server runs the match
//! simulation at a fixed tick rate and streams snapshots over WebSocket;
//! the `client` module holds the client-side snapshot interpolation.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod rooms;
pub mod session;
pub mod util;
pub mod ws;
