use std::{future, time::Duration};

use tokio::time::{Instant, sleep_until};

/// Timer the session wants armed: fire `ticket` after `after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    /// Value handed back when the timer fires, used to detect stale timers.
    pub ticket: u64,
    /// Delay before the timer fires.
    pub after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct PendingTransition {
    ticket: u64,
    deadline: Instant,
}

/// Owns the single delayed transition of a session.
///
/// Arming replaces whatever was pending and cancelling clears it, so there is never
/// more than one timer per session and teardown is one call.
#[derive(Debug, Default)]
pub struct TransitionScheduler {
    pending: Option<PendingTransition>,
}

impl TransitionScheduler {
    /// Scheduler with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `request`, replacing any pending transition.
    pub fn arm(&mut self, request: TimerRequest) {
        self.pending = Some(PendingTransition {
            ticket: request.ticket,
            deadline: Instant::now() + request.after,
        });
    }

    /// Drop the pending transition, if any.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// True when a transition is waiting to fire.
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Wait for the pending transition and disarm it, yielding its ticket.
    ///
    /// Never resolves while nothing is armed. Cancel-safe: dropping the future
    /// before it resolves leaves the transition armed.
    pub async fn fired(&mut self) -> u64 {
        let Some(pending) = self.pending else {
            return future::pending().await;
        };

        sleep_until(pending.deadline).await;
        self.pending = None;
        pending.ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_the_requested_delay() {
        let mut scheduler = TransitionScheduler::new();
        let start = Instant::now();
        scheduler.arm(TimerRequest {
            ticket: 7,
            after: Duration::from_millis(500),
        });

        assert_eq!(scheduler.fired().await, 7);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(502));
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn arming_replaces_the_previous_timer() {
        let mut scheduler = TransitionScheduler::new();
        scheduler.arm(TimerRequest {
            ticket: 1,
            after: Duration::from_millis(100),
        });
        scheduler.arm(TimerRequest {
            ticket: 2,
            after: Duration::from_millis(300),
        });

        assert_eq!(scheduler.fired().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_scheduler_never_fires() {
        let mut scheduler = TransitionScheduler::new();
        scheduler.arm(TimerRequest {
            ticket: 1,
            after: Duration::from_millis(100),
        });
        scheduler.cancel();

        let fired = tokio::time::timeout(Duration::from_secs(10), scheduler.fired()).await;
        assert!(fired.is_err());
    }
}
