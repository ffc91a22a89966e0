//! Countdown timers (spec.md §4.2).
//!
//! Each timer is a long-lived task that ticks once a second for the
//! lifetime of the owning FSM, decrementing a shared counter. Writing a
//! nonzero value (re)starts the countdown; writing zero stops it. This
//! avoids spawning and aborting a task on every FSM start/stop cycle, which
//! is how the original implementation's per-call `asyncio.create_task`
//! timers worked and is the kind of thing that leads to orphaned tasks.
//!
//! "Expiration events are always delivered via the event queue; a timer
//! never calls into FSM logic directly" (spec.md §4.2): the tick that
//! drives a counter to zero pushes the matching expiration event onto the
//! owning FSM's [`crate::fsm::EventQueue`] itself, rather than setting a
//! flag the dispatch loop must separately poll.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::fsm::{Event, EventQueue};

pub const DEFAULT_CONNECT_RETRY_TIME: u32 = 5;
pub const DEFAULT_HOLD_TIME: u16 = 90;
pub const DEFAULT_KEEPALIVE_TIME: u16 = 30;

#[derive(Debug)]
pub struct CountdownTimer {
    remaining: Arc<AtomicU32>,
    _task: JoinHandle<()>,
}

impl CountdownTimer {
    /// Spawns the background ticker. `remaining` starts at zero (stopped).
    /// `make_event` is called exactly on the tick a running countdown
    /// reaches zero, and its result is pushed onto `queue`.
    pub fn spawn(queue: Arc<EventQueue>, make_event: impl Fn() -> Event + Send + 'static) -> Self {
        let remaining = Arc::new(AtomicU32::new(0));
        let remaining_task = remaining.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let expired = remaining_task
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| if v == 0 { None } else { Some(v - 1) })
                    .map(|prev| prev == 1)
                    .unwrap_or(false);
                if expired {
                    queue.push(make_event());
                }
            }
        });
        Self {
            remaining,
            _task: task,
        }
    }

    /// Starts (or restarts) the countdown from `seconds`. Zero stops it.
    pub fn set(&self, seconds: u32) {
        self.remaining.store(seconds, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.set(0);
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.remaining() > 0
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self._task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_after_configured_seconds() {
        let queue = EventQueue::new();
        let timer = CountdownTimer::spawn(queue.clone(), || Event::ConnectRetryTimerExpires);
        timer.set(3);
        assert!(timer.is_running());
        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert!(!timer.is_running());
        let (_, event) = queue.next().await;
        assert!(matches!(event, Event::ConnectRetryTimerExpires));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_expiry() {
        let queue = EventQueue::new();
        let timer = CountdownTimer::spawn(queue.clone(), || Event::HoldTimerExpires);
        timer.set(2);
        timer.stop();
        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert!(queue.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resets_countdown() {
        let queue = EventQueue::new();
        let timer = CountdownTimer::spawn(queue.clone(), || Event::KeepaliveTimerExpires);
        timer.set(2);
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        timer.set(5);
        assert_eq!(timer.remaining(), 5);
    }
}
