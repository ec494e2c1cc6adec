//! Live scheduler loop tests with fast ticks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;

use modqueue::supervisor::{DailyJob, Scheduler};

fn midnight() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).unwrap()
}

#[tokio::test]
async fn past_trigger_time_fires_exactly_once_today() {
    // Midnight is always in the past, so the first tick is due and every
    // later tick the same day is not.
    let fired = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::new();

    let counter = fired.clone();
    let job: DailyJob = Arc::new(move || {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });
    scheduler.schedule(midnight(), Duration::from_millis(5), job);

    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.cancel();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_job_still_consumes_the_day() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::new();

    let counter = attempts.clone();
    let job: DailyJob = Arc::new(move || {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("processing endpoint unavailable")
        })
    });
    scheduler.schedule(midnight(), Duration::from_millis(5), job);

    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.cancel();
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "no same-day retry");
}

#[tokio::test]
async fn cancel_is_idempotent_and_stops_firing() {
    let fired = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::new();

    let counter = fired.clone();
    let job: DailyJob = Arc::new(move || {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });
    scheduler.schedule(midnight(), Duration::from_millis(5), job);

    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.cancel();
    scheduler.cancel();

    let after_cancel = fired.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fired.load(Ordering::SeqCst), after_cancel);
}

#[tokio::test]
async fn cancel_without_schedule_is_safe() {
    let scheduler = Scheduler::new();
    scheduler.cancel();
    scheduler.cancel();
}
