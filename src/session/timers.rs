//! Cancellable background timers that post into the match loop

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

/// Owns a spawned timer task and aborts it when dropped
#[derive(Debug)]
pub struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Post `make()` every `period`, first firing one period from now.
/// Late ticks are skipped rather than bunched up.
pub fn spawn_repeating<T, F>(period: Duration, tx: mpsc::Sender<T>, mut make: F) -> TaskGuard
where
    T: Send + 'static,
    F: FnMut() -> T + Send + 'static,
{
    TaskGuard(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if tx.send(make()).await.is_err() {
                break;
            }
        }
    }))
}

/// Post `event` once after `delay`
pub fn spawn_after<T>(delay: Duration, tx: mpsc::Sender<T>, event: T) -> TaskGuard
where
    T: Send + 'static,
{
    TaskGuard(tokio::spawn(async move {
        sleep(delay).await;
        let _ = tx.send(event).await;
    }))
}
