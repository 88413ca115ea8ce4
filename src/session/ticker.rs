//! The status ticker: a repeating timer owned by the `Analyzing` state.
//!
//! A [`StatusTicker`] is started when the session enters `Analyzing` and
//! stopped when it leaves, on every path. Dropping the ticker stops it, so
//! holding it inside the session state is enough to guarantee that.
//!
//! The ticker only counts. The caller's closure receives tick numbers
//! `1, 2, 3, …` one `period` apart; tick `0` (the first message) is the
//! caller's job at start time so it is visible without waiting for the
//! timer task to be scheduled.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Repeating timer task; stops on [`StatusTicker::stop`] or drop.
#[derive(Debug)]
pub struct StatusTicker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl StatusTicker {
    /// Spawn the timer. Must be called from within a tokio runtime.
    pub fn start<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut(usize) + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut tick = 0usize;
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = timer.tick() => {
                        tick = tick.wrapping_add(1);
                        trace!("status tick {}", tick);
                        on_tick(tick);
                    }
                }
            }
        });

        Self { token, handle }
    }

    /// Stop the timer. No tick is delivered after this returns, except one
    /// that was already executing on another worker thread.
    pub fn stop(&self) {
        self.token.cancel();
        self.handle.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for StatusTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
