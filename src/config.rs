// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Driver tuning knobs.

use std::time::Duration;

/// Default bound on a status or DMA-command busy-wait.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on a wait for the completion interrupt.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pure-spin iterations before a busy-wait starts yielding.
pub const DEFAULT_SPIN_ITERATIONS: u32 = 1_000;

/// Configuration applied to a card at attach time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardConfig {
    /// Upper bound on any busy-bit wait.
    pub busy_timeout: Duration,
    /// Upper bound on any completion-signal wait.
    pub completion_timeout: Duration,
    /// Spin iterations before a busy-wait yields the thread between reads.
    pub spin_iterations: u32,
    /// Run the liveness handshake during attach.
    pub check_liveness: bool,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            spin_iterations: DEFAULT_SPIN_ITERATIONS,
            check_liveness: true,
        }
    }
}

impl CardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the busy-wait bound.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set the completion-interrupt bound.
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Apply one bound to both busy-waits and completion waits.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_busy_timeout(timeout)
            .with_completion_timeout(timeout)
    }

    pub fn with_spin_iterations(mut self, iterations: u32) -> Self {
        self.spin_iterations = iterations;
        self
    }

    pub fn with_liveness_check(mut self, check: bool) -> Self {
        self.check_liveness = check;
        self
    }
}
