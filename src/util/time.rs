//! Time utilities for the match loop

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as i64
}

/// Tick rate configuration
pub const SERVER_TICK_RATE: u32 = 30; // 30 simulation steps per second
pub const SNAPSHOT_RATE: u32 = 15; // 15 snapshots per second
pub const INPUT_SEND_RATE: u32 = 20; // client input frames per second

/// Simulation step length in milliseconds
pub fn tick_delta_ms() -> f64 {
    1000.0 / SERVER_TICK_RATE as f64
}

pub fn tick_interval() -> Duration {
    Duration::from_millis(1000 / SERVER_TICK_RATE as u64)
}

pub fn snapshot_interval() -> Duration {
    Duration::from_millis(1000 / SNAPSHOT_RATE as u64)
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(std::time::Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Monotonic millisecond clock for simulation and room bookkeeping.
///
/// Built on the tokio clock so paused-time tests drive it with
/// `tokio::time::advance`.
#[derive(Debug, Clone, Copy)]
pub struct ServerClock {
    origin: Instant,
}

impl ServerClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let clock = ServerClock::new();
        assert_eq!(clock.now_ms(), 0);

        tokio::time::advance(Duration::from_millis(1_250)).await;
        assert_eq!(clock.now_ms(), 1_250);
    }

    #[test]
    fn test_intervals_match_rates() {
        assert_eq!(tick_interval(), Duration::from_millis(33));
        assert_eq!(snapshot_interval(), Duration::from_millis(66));
        assert!((tick_delta_ms() - 33.333).abs() < 0.01);
    }
}
