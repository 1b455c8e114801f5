//! One-shot delayed delivery
//!
//! A scheduled callback sleeps on the system's `TimeProvider` and fires at
//! most once. Cancelling before it fires guarantees it never runs.

use anemone_core::constants::SCHEDULE_DELAY_MS_MAX;
use anemone_core::error::{Error, Result};
use anemone_core::io::TimeProvider;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const TIMER_PENDING: u8 = 0;
const TIMER_FIRED: u8 = 1;
const TIMER_CANCELLED: u8 = 2;

#[derive(Debug)]
struct TimerState {
    status: AtomicU8,
    cancelled: Notify,
}

/// Handle to a scheduled callback
#[derive(Debug, Clone)]
pub struct Cancellable {
    timer: Arc<TimerState>,
}

impl Cancellable {
    /// Prevent the callback from running
    ///
    /// Returns true if this call cancelled it; false if it already fired or
    /// was already cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .timer
            .status
            .compare_exchange(
                TIMER_PENDING,
                TIMER_CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if cancelled {
            // Wake the sleeper early so it does not linger until the deadline
            self.timer.cancelled.notify_one();
        }
        cancelled
    }

    /// Check if the callback was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.timer.status.load(Ordering::Acquire) == TIMER_CANCELLED
    }

    /// Check if the callback has run (or started running)
    pub fn is_fired(&self) -> bool {
        self.timer.status.load(Ordering::Acquire) == TIMER_FIRED
    }
}

/// Delayed-callback scheduler
#[derive(Debug, Clone)]
pub struct Scheduler {
    time: Arc<dyn TimeProvider>,
}

impl Scheduler {
    /// Create a scheduler over the given clock
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self { time }
    }

    /// Run `callback` once after `delay`; never waits
    pub fn schedule_once<F>(&self, delay: Duration, callback: F) -> Result<Cancellable>
    where
        F: FnOnce() + Send + 'static,
    {
        let delay_ms = delay.as_millis() as u64;
        if delay_ms > SCHEDULE_DELAY_MS_MAX {
            return Err(Error::ScheduleDelayTooLong {
                delay_ms,
                limit_ms: SCHEDULE_DELAY_MS_MAX,
            });
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::internal(format!("scheduler needs a tokio runtime: {}", e)))?;

        let timer = Arc::new(TimerState {
            status: AtomicU8::new(TIMER_PENDING),
            cancelled: Notify::new(),
        });

        let task_timer = timer.clone();
        let time = self.time.clone();
        handle.spawn(async move {
            tokio::select! {
                _ = time.sleep_ms(delay_ms) => {}
                _ = task_timer.cancelled.notified() => return,
            }

            let fire = task_timer
                .status
                .compare_exchange(
                    TIMER_PENDING,
                    TIMER_FIRED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
            if fire {
                callback();
            }
        });

        Ok(Cancellable { timer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anemone_core::io::ManualClock;
    use std::sync::atomic::AtomicUsize;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn counting_callback(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_fires_after_delay() {
        let clock = ManualClock::default();
        let scheduler = Scheduler::new(Arc::new(clock.clone()));
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = scheduler
            .schedule_once(Duration::from_millis(50), counting_callback(&fired))
            .unwrap();

        settle().await;
        clock.advance_ms(49);
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!handle.is_fired());

        clock.advance_ms(1);
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(handle.is_fired());

        // Too late to cancel
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn test_cancel_before_fire() {
        let clock = ManualClock::default();
        let scheduler = Scheduler::new(Arc::new(clock.clone()));
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = scheduler
            .schedule_once(Duration::from_millis(10), counting_callback(&fired))
            .unwrap();

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(handle.is_cancelled());

        clock.advance_ms(100);
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delay_limit() {
        let scheduler = Scheduler::new(Arc::new(ManualClock::default()));
        let result = scheduler.schedule_once(
            Duration::from_millis(SCHEDULE_DELAY_MS_MAX + 1),
            || {},
        );
        assert!(matches!(result, Err(Error::ScheduleDelayTooLong { .. })));
    }
}
