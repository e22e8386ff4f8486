//! Match lifecycle on the server: the match loop and its timers

pub mod orchestrator;
pub mod reconnect;
pub mod timers;

pub use orchestrator::{LoopEvent, LoopStats, MatchOrchestrator};
