// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! One-shot completion hand-off from the interrupt handler to a waiter.
//!
//! The interrupt handler calls [`CompletionSignal::complete`]; the requester
//! blocked in [`CompletionSignal::wait`] consumes the event and clears it
//! before returning. Only the flag releases a waiter, so a spurious condvar
//! wake-up goes straight back to sleep.

use crate::error::CryptoCardError;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Completion flag plus wait set, one per device.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    done: Mutex<bool>,
    cond: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the in-flight operation complete and wake the waiter.
    pub fn complete(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        // At most one waiter exists while the dispatch lock is held.
        self.cond.notify_all();
    }

    /// Block until a completion is signalled, consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoCardError::Timeout`] if nothing arrives within `timeout`;
    /// the flag is left untouched in that case.
    pub fn wait(&self, timeout: Duration, stage: &'static str) -> Result<(), CryptoCardError> {
        let start = Instant::now();
        let done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut done, _) = self
            .cond
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);

        if !*done {
            return Err(CryptoCardError::Timeout {
                stage,
                waited: start.elapsed(),
            });
        }
        *done = false;
        Ok(())
    }

    /// Returns true if a completion is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop a completion nobody is going to consume.
    pub(crate) fn discard(&self) -> bool {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *done, false)
    }
}
