//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Lifecycle timings of rooms and matches
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchTimings {
    /// Countdown announced on match start and resume
    pub countdown_ms: u64,
    /// Grace period for a disconnected player before forfeit
    pub reconnect_window_ms: u64,
    /// Waiting rooms untouched for this long are closed
    pub room_idle_ttl_ms: u64,
    /// Ended rooms untouched for this long are closed
    pub room_ended_ttl_ms: u64,
    pub sweep_interval: Duration,
}

impl Default for MatchTimings {
    fn default() -> Self {
        Self {
            countdown_ms: 3_000,
            reconnect_window_ms: 30_000,
            room_idle_ttl_ms: 15 * 60 * 1_000,
            room_ended_ttl_ms: 10 * 60 * 1_000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl MatchTimings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            countdown_ms: env_millis("MATCH_COUNTDOWN_MS", defaults.countdown_ms)?,
            reconnect_window_ms: env_millis("RECONNECT_WINDOW_MS", defaults.reconnect_window_ms)?,
            room_idle_ttl_ms: env_millis("ROOM_IDLE_TTL_MS", defaults.room_idle_ttl_ms)?,
            room_ended_ttl_ms: env_millis("ROOM_ENDED_TTL_MS", defaults.room_ended_ttl_ms)?,
            sweep_interval: defaults.sweep_interval,
        })
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS; `*` allows any
    pub cors_origins: Vec<String>,
    pub timings: MatchTimings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            cors_origins: parse_origins(&env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".to_string())),

            timings: MatchTimings::from_env()?,
        })
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: "info".to_string(),
            cors_origins: vec!["*".to_string()],
            timings: MatchTimings::default(),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if origins.is_empty() {
        vec!["*".to_string()]
    } else {
        origins
    }
}

fn env_millis(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_millis(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_millis(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber(name, raw.to_string()))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    InvalidNumber(&'static str, String),

    #[error("Invalid server address format")]
    InvalidAddress,
}
