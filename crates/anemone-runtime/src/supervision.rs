//! Supervision strategies for actor failures
//!
//! A failure is a handler error, a handler panic, or a failed `on_start`.
//! The strategy turns each failure into exactly one `Directive`, which the
//! actor's dispatcher applies before taking the next envelope.

use anemone_core::config::{SupervisionConfig, SupervisionKind};
use anemone_core::constants::{
    RESTART_BACKOFF_MS_MAX, RESTART_COUNT_MAX_DEFAULT, RESTART_WINDOW_MS_DEFAULT,
};
use std::collections::VecDeque;
use std::time::Duration;

/// What to do when an actor fails
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorStrategy {
    /// Recreate the actor from its factory, keeping its mailbox
    Restart(RestartPolicy),
    /// Stop the actor and discard its pending envelopes
    Stop,
    /// Stop the actor and hand the failure to its parent
    Escalate,
}

impl Default for SupervisorStrategy {
    fn default() -> Self {
        Self::Restart(RestartPolicy::default())
    }
}

impl SupervisorStrategy {
    /// Restart with the default budget
    pub fn restart() -> Self {
        Self::default()
    }

    /// Strategy described by a configuration section
    pub fn from_config(config: &SupervisionConfig) -> Self {
        match config.kind {
            SupervisionKind::Restart => Self::Restart(RestartPolicy::new(
                config.max_restarts_count,
                Duration::from_millis(config.restart_window_ms),
            )),
            SupervisionKind::Stop => Self::Stop,
            SupervisionKind::Escalate => Self::Escalate,
        }
    }

    /// Decide how to handle one failure at `now_ms`
    pub(crate) fn decide(&self, history: &mut RestartHistory, now_ms: u64) -> Directive {
        match self {
            Self::Restart(policy) => {
                let window_ms = policy.within.as_millis() as u64;
                let recent = history.record_failure(now_ms, window_ms);
                if recent > policy.max_restarts as usize {
                    Directive::Escalate
                } else {
                    Directive::Restart {
                        delay: policy.backoff.delay_for_attempt(recent as u32),
                    }
                }
            }
            Self::Stop => Directive::Stop,
            Self::Escalate => Directive::Escalate,
        }
    }
}

/// Restart budget and pacing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestartPolicy {
    /// Restarts allowed inside `within`
    pub max_restarts: u32,
    /// Sliding window for the budget
    pub within: Duration,
    /// Delay applied before each restart
    pub backoff: RestartBackoff,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new(
            RESTART_COUNT_MAX_DEFAULT,
            Duration::from_millis(RESTART_WINDOW_MS_DEFAULT),
        )
    }
}

impl RestartPolicy {
    /// Policy with an immediate restart
    pub fn new(max_restarts: u32, within: Duration) -> Self {
        debug_assert!(!within.is_zero(), "restart window must be positive");
        Self {
            max_restarts,
            within,
            backoff: RestartBackoff::Immediate,
        }
    }

    /// Set the backoff
    pub fn with_backoff(mut self, backoff: RestartBackoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Delay before a restart
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RestartBackoff {
    /// Restart right away
    #[default]
    Immediate,
    /// Same delay every time
    Fixed(Duration),
    /// `initial * 2^(attempt - 1)`, capped at `max`
    Exponential {
        /// Delay before the first restart
        initial: Duration,
        /// Upper bound
        max: Duration,
    },
}

impl RestartBackoff {
    /// Delay for the given attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = match self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(32);
                let factor = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(*max)
            }
        };
        delay.min(Duration::from_millis(RESTART_BACKOFF_MS_MAX))
    }
}

/// Outcome of one supervision decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Recreate the instance after `delay`
    Restart {
        /// Backoff before recreating
        delay: Duration,
    },
    /// Stop the actor
    Stop,
    /// Stop the actor and notify the parent
    Escalate,
}

/// Failure timestamps inside the sliding restart window
#[derive(Debug, Default)]
pub(crate) struct RestartHistory {
    failures: VecDeque<u64>,
}

impl RestartHistory {
    /// Record a failure and return how many fall inside the window
    pub(crate) fn record_failure(&mut self, now_ms: u64, window_ms: u64) -> usize {
        self.prune(now_ms, window_ms);
        self.failures.push_back(now_ms);
        self.failures.len()
    }

    fn prune(&mut self, now_ms: u64, window_ms: u64) {
        while let Some(&at) = self.failures.front() {
            if now_ms.saturating_sub(at) < window_ms {
                break;
            }
            self.failures.pop_front();
        }
    }
}
