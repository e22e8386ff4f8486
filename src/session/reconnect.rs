//! Per-player reconnect deadlines

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::ws::protocol::PlayerId;

use super::timers::{spawn_after, TaskGuard};

struct Pending {
    token: u64,
    _guard: TaskGuard,
}

/// Deferred expiry notices keyed by (room, player).
///
/// Each armed timer posts one event built from its token. A timer that was
/// cancelled or replaced may still have its event queued; `take_expired`
/// tells live expiries apart from stale ones.
pub struct ReconnectTimers<T> {
    tx: mpsc::Sender<T>,
    pending: HashMap<(String, PlayerId), Pending>,
    next_token: u64,
}

impl<T: Send + 'static> ReconnectTimers<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
            next_token: 0,
        }
    }

    /// Arm a timer, replacing any pending one for the same player
    pub fn start(
        &mut self,
        room_code: &str,
        player_id: PlayerId,
        window: Duration,
        make_event: impl FnOnce(u64) -> T,
    ) -> u64 {
        self.next_token += 1;
        let token = self.next_token;

        let guard = spawn_after(window, self.tx.clone(), make_event(token));
        self.pending.insert(
            (room_code.to_string(), player_id),
            Pending {
                token,
                _guard: guard,
            },
        );

        token
    }

    /// Returns whether a timer was pending
    pub fn cancel(&mut self, room_code: &str, player_id: PlayerId) -> bool {
        self.pending
            .remove(&(room_code.to_string(), player_id))
            .is_some()
    }

    pub fn cancel_room(&mut self, room_code: &str) {
        self.pending.retain(|(code, _), _| code != room_code);
    }

    pub fn is_pending(&self, room_code: &str, player_id: PlayerId) -> bool {
        self.pending.contains_key(&(room_code.to_string(), player_id))
    }

    /// Consume an expiry. False if the timer was cancelled or replaced.
    pub fn take_expired(&mut self, room_code: &str, player_id: PlayerId, token: u64) -> bool {
        let key = (room_code.to_string(), player_id);
        match self.pending.get(&key) {
            Some(pending) if pending.token == token => {
                self.pending.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
