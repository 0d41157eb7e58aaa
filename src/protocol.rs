// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Register-level protocol engine.
//!
//! # Status sequence
//!
//! Every MMIO and mapped-window operation runs the same sequence:
//!
//! 1. write the status register with the operation and notification bits;
//! 2. write the payload length;
//! 3. wait for the busy bit to clear (the card drains prior state);
//! 4. write the data-window offset (0xA8) to the trigger register;
//! 5. poll until busy clears, or sleep on the completion signal.
//!
//! The DMA variant programs the descriptor registers instead and drives the
//! DMA command register; see [`crate::dma`].
//!
//! Callers must hold the card's dispatch lock for the whole sequence and must
//! have seen the card idle ([`Protocol::wait_idle`]) before touching the data
//! window, since an operation abandoned by a timeout can still be running.

use crate::completion::CompletionSignal;
use crate::config::CardConfig;
use crate::error::CryptoCardError;
use crate::opcode::Operation;
use crate::regs::{DmaCommand, RegisterMap, Status};
use crate::session::Notification;
use std::time::Instant;

/// Protocol driver over one card's registers, borrowed for a single transfer.
pub struct Protocol<'a> {
    regs: &'a RegisterMap,
    signal: &'a CompletionSignal,
    config: &'a CardConfig,
}

impl<'a> Protocol<'a> {
    pub fn new(regs: &'a RegisterMap, signal: &'a CompletionSignal, config: &'a CardConfig) -> Self {
        Self {
            regs,
            signal,
            config,
        }
    }

    pub fn regs(&self) -> &RegisterMap {
        self.regs
    }

    /// Status register value selecting `op` and `notify`.
    pub fn status_bits(op: Operation, notify: Notification) -> Status {
        let mut status = Status::empty();
        if op.is_decrypt() {
            status |= Status::DECRYPT;
        }
        if notify == Notification::Interrupt {
            status |= Status::INTERRUPT;
        }
        status
    }

    /// DMA command register value starting `op` with `notify`.
    pub fn dma_command_bits(op: Operation, notify: Notification) -> DmaCommand {
        let mut cmd = DmaCommand::START;
        if op.is_decrypt() {
            cmd |= DmaCommand::DECRYPT;
        }
        if notify == Notification::Interrupt {
            cmd |= DmaCommand::INTERRUPT;
        }
        cmd
    }

    /// Spin, then yield, while `is_busy` holds; bounded by the busy timeout.
    pub fn busy_wait(
        &self,
        stage: &'static str,
        mut is_busy: impl FnMut() -> bool,
    ) -> Result<(), CryptoCardError> {
        for _ in 0..self.config.spin_iterations {
            if !is_busy() {
                return Ok(());
            }
            core::hint::spin_loop();
        }

        let start = Instant::now();
        while is_busy() {
            if start.elapsed() >= self.config.busy_timeout {
                log::warn!("device still busy after {:?} ({})", start.elapsed(), stage);
                return Err(CryptoCardError::Timeout {
                    stage,
                    waited: start.elapsed(),
                });
            }
            std::thread::yield_now();
        }
        Ok(())
    }

    /// Wait until neither the MMIO unit nor the DMA engine reports busy.
    pub fn wait_idle(&self, stage: &'static str) -> Result<(), CryptoCardError> {
        self.busy_wait(stage, || self.regs.is_busy() || self.regs.is_dma_busy())
    }

    /// Drop any completion still pending before a new operation is started.
    pub fn arm_completion(&self) {
        if self.signal.discard() {
            log::debug!("dropped a completion raised before the trigger");
        }
    }

    /// Block on the completion signal until `is_busy` reports the operation
    /// finished, bounded by the completion timeout.
    ///
    /// A completion only counts once the card is idle; one that arrives while
    /// the operation is still running belongs to an earlier operation and is
    /// consumed without ending the wait.
    pub fn wait_for_interrupt(
        &self,
        stage: &'static str,
        mut is_busy: impl FnMut() -> bool,
    ) -> Result<(), CryptoCardError> {
        let start = Instant::now();
        loop {
            let remaining = self
                .config
                .completion_timeout
                .saturating_sub(start.elapsed());
            self.signal.wait(remaining, stage).map_err(|e| {
                let e = match e {
                    CryptoCardError::Timeout { stage, .. } => CryptoCardError::Timeout {
                        stage,
                        waited: start.elapsed(),
                    },
                    other => other,
                };
                log::warn!("{}", e);
                e
            })?;
            if !is_busy() {
                return Ok(());
            }
            log::warn!("{}: completion arrived while the card was still busy", stage);
        }
    }

    /// Run the status sequence on `len` bytes already in the data window.
    pub fn run_status_sequence(
        &self,
        op: Operation,
        notify: Notification,
        len: u32,
    ) -> Result<(), CryptoCardError> {
        let status = Self::status_bits(op, notify);
        self.regs.write_status(status);
        self.regs.write_data_len(len);
        log::trace!("{}: status={:#04x} len={}", op, status.bits(), len);

        self.busy_wait("status busy before trigger", || self.regs.is_busy())?;

        log::trace!("{}: device idle, triggering", op);
        self.arm_completion();
        self.regs.trigger();

        match notify {
            Notification::Poll => {
                self.busy_wait("status busy after trigger", || self.regs.is_busy())
            }
            Notification::Interrupt => {
                self.wait_for_interrupt("MMIO completion interrupt", || self.regs.is_busy())
            }
        }
    }

    /// MMIO transfer: copy `data` into the window, run the sequence, copy the result back.
    pub fn mmio(
        &self,
        op: Operation,
        notify: Notification,
        data: &mut [u8],
    ) -> Result<(), CryptoCardError> {
        let len = window_len(data.len())?;
        self.regs.write_window(0, data);
        self.run_status_sequence(op, notify, len)?;
        self.regs.read_window(0, data);
        Ok(())
    }

    /// Mapped-window transfer: the payload already sits in the window.
    pub fn mapped(
        &self,
        op: Operation,
        notify: Notification,
        len: usize,
    ) -> Result<(), CryptoCardError> {
        self.run_status_sequence(op, notify, window_len(len)?)
    }
}

fn window_len(len: usize) -> Result<u32, CryptoCardError> {
    if len > crate::regs::MAX_WINDOW {
        return Err(CryptoCardError::TransferTooLarge {
            length: len,
            limit: crate::regs::MAX_WINDOW,
        });
    }
    Ok(len as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bits() {
        assert_eq!(
            Protocol::status_bits(Operation::Encrypt, Notification::Poll).bits(),
            0x00
        );
        assert_eq!(
            Protocol::status_bits(Operation::Decrypt, Notification::Poll).bits(),
            0x02
        );
        assert_eq!(
            Protocol::status_bits(Operation::Encrypt, Notification::Interrupt).bits(),
            0x80
        );
        assert_eq!(
            Protocol::status_bits(Operation::Decrypt, Notification::Interrupt).bits(),
            0x82
        );
    }

    #[test]
    fn test_dma_command_bits() {
        assert_eq!(
            Protocol::dma_command_bits(Operation::Encrypt, Notification::Poll).bits(),
            0x1
        );
        assert_eq!(
            Protocol::dma_command_bits(Operation::Decrypt, Notification::Poll).bits(),
            0x3
        );
        assert_eq!(
            Protocol::dma_command_bits(Operation::Encrypt, Notification::Interrupt).bits(),
            0x5
        );
        assert_eq!(
            Protocol::dma_command_bits(Operation::Decrypt, Notification::Interrupt).bits(),
            0x7
        );
    }

    #[test]
    fn test_window_len_bound() {
        assert_eq!(window_len(crate::regs::MAX_WINDOW).unwrap(), 0xFFF58);
        assert!(matches!(
            window_len(crate::regs::MAX_WINDOW + 1),
            Err(CryptoCardError::TransferTooLarge { .. })
        ));
    }
}
