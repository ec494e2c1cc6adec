//! Daily processing scheduler
//!
//! One recurring job fired at a fixed wall-clock time, at most once per
//! calendar day. The loop wakes on a coarse tick; any number of ticks
//! past the trigger collapse into a single firing, and missed ticks never
//! build a backlog. Job failures are logged and swallowed so the loop
//! survives until the next day.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The scheduled callback. Built fresh for every firing.
pub type DailyJob =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

/// Fires one job once per calendar day at a configured time
pub struct Scheduler {
    cancel_tx: broadcast::Sender<()>,
    cancelled: AtomicBool,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// Whether the job is due: the date advanced past the last firing and the
/// trigger time has been reached.
fn due(now: NaiveDateTime, time_of_day: NaiveTime, last_fired: Option<NaiveDate>) -> bool {
    if last_fired == Some(now.date()) {
        return false;
    }
    now.time() >= time_of_day
}

impl Scheduler {
    pub fn new() -> Self {
        let (cancel_tx, _) = broadcast::channel(4);
        Self {
            cancel_tx,
            cancelled: AtomicBool::new(false),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Register the recurring job and start the tick loop.
    pub fn schedule(&self, time_of_day: NaiveTime, tick: Duration, job: DailyJob) {
        let mut cancel_rx = self.cancel_tx.subscribe();
        info!(%time_of_day, ?tick, "daily job scheduled");

        let handle = tokio::spawn(async move {
            let mut last_fired: Option<NaiveDate> = None;
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Local::now().naive_local();
                        if due(now, time_of_day, last_fired) {
                            info!(date = %now.date(), "running daily job");
                            if let Err(e) = (job)().await {
                                warn!(error = %e, "daily job failed; next attempt tomorrow");
                            }
                            // The day is consumed whether or not the job
                            // succeeded; retry policy belongs to the caller.
                            last_fired = Some(now.date());
                        }
                    }
                    _ = cancel_rx.recv() => {
                        debug!("scheduler cancelled");
                        break;
                    }
                }
            }
        });

        let mut slot = self.task.lock();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// Stop the loop. Idempotent; safe to call from the shutdown path.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.cancel_tx.send(());
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
