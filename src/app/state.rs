//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::rooms::RoomManager;
use crate::session::{LoopEvent, LoopStats, MatchOrchestrator};
use crate::ws::hub::ConnectionHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: ConnectionHub,
    /// Inbox of the match loop
    pub loop_tx: mpsc::Sender<LoopEvent>,
    pub stats: Arc<LoopStats>,
}

impl AppState {
    /// Build the state and the match loop that serves it. The caller spawns
    /// [`MatchOrchestrator::run`] with the returned receiver.
    pub fn new(config: Config) -> (Self, MatchOrchestrator, mpsc::Receiver<LoopEvent>) {
        let config = Arc::new(config);
        let hub = ConnectionHub::new();
        let stats = Arc::new(LoopStats::default());

        let (orchestrator, inbox) = MatchOrchestrator::new(
            RoomManager::new(),
            hub.clone(),
            config.timings.clone(),
            stats.clone(),
        );

        let state = Self {
            config,
            hub,
            loop_tx: orchestrator.sender(),
            stats,
        };

        (state, orchestrator, inbox)
    }
}
