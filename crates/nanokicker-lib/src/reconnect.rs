//! Reopening the motherboard link after it drops.
//!
//! Attempts are spaced out by a doubling delay, capped by the policy. A
//! reopen only counts as a success once the fresh scan has completed.

use std::time::{Duration, Instant};

use crate::board::Board;
use crate::discovery::{ScanOptions, ScanReport};

/// Delay bounds for reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait after the first failed attempt.
    pub initial: Duration,
    /// Longest wait between attempts.
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

/// Backoff bookkeeping for one port.
#[derive(Debug)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    delay: Duration,
    next_attempt: Option<Instant>,
    failures: u32,
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        ReconnectState {
            delay: policy.initial,
            policy,
            next_attempt: None,
            failures: 0,
        }
    }

    /// True when no attempt is pending a backoff wait.
    pub fn is_due(&self) -> bool {
        self.next_attempt.is_none_or(|t| Instant::now() >= t)
    }

    /// Schedule the next attempt `delay` from now, then double the delay.
    fn failed(&mut self) {
        self.failures += 1;
        self.next_attempt = Some(Instant::now() + self.delay);
        self.delay = (self.delay * 2).min(self.policy.max);
    }

    fn succeeded(&mut self) {
        self.failures = 0;
        self.delay = self.policy.initial;
        self.next_attempt = None;
    }

    /// Failed attempts since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Wait that will follow the next failure.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Reopen `port` and rescan, unless the backoff wait is still running.
///
/// Returns the scan report on success. A failed open or a loss during the
/// scan leaves the board disconnected, pushes the next attempt back and
/// returns `None`.
pub fn try_reconnect(
    board: &mut Board,
    state: &mut ReconnectState,
    port: &str,
    options: &ScanOptions,
) -> Option<ScanReport> {
    if !state.is_due() {
        return None;
    }
    match board.connect(port).and_then(|()| board.scan(options)) {
        Ok(report) => {
            state.succeeded();
            log::info!("reconnected to {port}, {} device(s)", report.found);
            Some(report)
        }
        Err(e) => {
            board.disconnect();
            let wait = state.delay;
            state.failed();
            log::warn!(
                "reconnect to {port} failed: {e} (attempt {}, retry in {:.1}s)",
                state.failures(),
                wait.as_secs_f64()
            );
            None
        }
    }
}
