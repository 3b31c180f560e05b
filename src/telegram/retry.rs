use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff};

use crate::errors::AppError;

/// Where the long poller currently is. `Fatal` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Polling,
    Backoff { attempt: u32 },
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    Wait { attempt: u32, delay: Duration },
    GiveUp,
}

/// Counts consecutive transient failures against a fixed budget and spaces
/// retries with exponential backoff. A success refills the budget.
#[derive(Debug)]
pub struct RetryBudget {
    policy: ExponentialBackoff,
    failures: u32,
    max_failures: u32,
}

impl RetryBudget {
    pub fn new(max_failures: u32, initial: Duration, max_interval: Duration) -> Self {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(initial)
            .with_max_interval(max_interval)
            .with_max_elapsed_time(None)
            .build();
        Self {
            policy,
            failures: 0,
            max_failures,
        }
    }

    pub fn for_polling(max_failures: u32) -> Self {
        Self::new(max_failures, Duration::from_millis(500), Duration::from_secs(30))
    }

    pub fn for_outbound() -> Self {
        Self::new(3, Duration::from_millis(250), Duration::from_secs(5))
    }

    #[cfg(test)]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn on_failure(&mut self, err: &AppError) -> RetryStep {
        if !err.is_transient() {
            return RetryStep::GiveUp;
        }
        self.failures += 1;
        if self.failures > self.max_failures {
            return RetryStep::GiveUp;
        }
        let delay = self
            .policy
            .next_backoff()
            .unwrap_or(self.policy.max_interval);
        let delay = err.retry_after().map_or(delay, |after| delay.max(after));
        RetryStep::Wait {
            attempt: self.failures,
            delay,
        }
    }

    pub fn on_success(&mut self) {
        self.failures = 0;
        self.policy.reset();
    }

    /// Final error once `on_failure` said `GiveUp`.
    pub fn escalate(&self, err: AppError) -> AppError {
        if err.is_transient() {
            AppError::RetryBudgetExhausted {
                attempts: self.failures,
                last: err.to_string(),
            }
        } else {
            err
        }
    }
}
