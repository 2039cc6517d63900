//! One-second call clock.
//!
//! The tracker never mutates anything from its timer task: each elapsed
//! second is posted as a [`DurationTick`] and applied by the owner through
//! [`DurationTracker::on_tick`]. Ticks are scheduled against the start
//! instant (`start + n s`), so a slow consumer does not accumulate drift.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub type TickCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// A scheduled second, tagged with the run that scheduled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationTick {
    pub run: u64,
    pub second: u64,
}

pub struct DurationTracker {
    tick_tx: mpsc::UnboundedSender<DurationTick>,
    on_tick: Option<TickCallback>,
    run: u64,
    running: bool,
    started_at: Option<Instant>,
    elapsed: u64,
    pending: Option<JoinHandle<()>>,
}

impl DurationTracker {
    pub fn new(tick_tx: mpsc::UnboundedSender<DurationTick>) -> Self {
        Self {
            tick_tx,
            on_tick: None,
            run: 0,
            running: false,
            started_at: None,
            elapsed: 0,
            pending: None,
        }
    }

    pub fn set_on_tick(&mut self, callback: Option<TickCallback>) {
        self.on_tick = callback;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whole seconds counted by the current (or last) run.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed
    }

    /// Reset to zero and start counting. No-op while already running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.run += 1;
        self.running = true;
        self.elapsed = 0;
        self.started_at = Some(Instant::now());
        debug!(target: "Call/Duration", "Duration tracker started (run {})", self.run);
        self.schedule(1);
    }

    /// Cancel the pending tick. Ticks already queued are discarded by
    /// [`Self::on_tick`].
    pub fn stop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        if self.running {
            self.running = false;
            debug!(
                target: "Call/Duration",
                "Duration tracker stopped at {}s (run {})",
                self.elapsed,
                self.run
            );
        }
    }

    /// Apply a tick from the queue. Returns the elapsed seconds when the
    /// tick belongs to the active run.
    pub fn on_tick(&mut self, tick: DurationTick) -> Option<u64> {
        if !self.running || tick.run != self.run {
            return None;
        }
        self.elapsed = tick.second;
        if let Some(callback) = &self.on_tick {
            callback(tick.second);
        }
        self.schedule(tick.second + 1);
        Some(tick.second)
    }

    fn schedule(&mut self, second: u64) {
        let Some(started_at) = self.started_at else {
            return;
        };
        let deadline = started_at + Duration::from_secs(second);
        let tick = DurationTick {
            run: self.run,
            second,
        };
        let tx = self.tick_tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(tick);
        }));
    }
}

impl Drop for DurationTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for DurationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationTracker")
            .field("run", &self.run)
            .field("running", &self.running)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}
