// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Request dispatcher.
//!
//! Every encrypt/decrypt enters through [`CryptoCard::dispatch`], which takes
//! the card's dispatch lock, writes the session key, resolves the request to
//! one [`TransferPath`], and holds the lock until that path has completed or
//! failed.

use crate::card::CryptoCard;
use crate::dma;
use crate::error::CryptoCardError;
use crate::handle::MappedWindow;
use crate::opcode::{Operation, DECRYPT_CHUNK_SIZE};
use crate::protocol::Protocol;
use crate::session::{Notification, SessionConfig, TransferMode};
use std::sync::PoisonError;

/// Largest copied request the driver stages in one call.
pub const MAX_STAGING: usize = DECRYPT_CHUNK_SIZE;

/// Where the payload of a transfer lives.
#[derive(Debug)]
pub enum Address<'a> {
    /// Caller memory, copied through the driver.
    Buffer(&'a mut [u8]),
    /// A mapped data window; the card works on it in place.
    Window(&'a MappedWindow),
}

/// Argument of an ENCRYPT or DECRYPT request.
#[derive(Debug)]
pub struct TransferRequest<'a> {
    pub address: Address<'a>,
    pub length: usize,
}

impl<'a> TransferRequest<'a> {
    /// Copied request over all of `buffer`.
    pub fn copied(buffer: &'a mut [u8]) -> Self {
        let length = buffer.len();
        Self {
            address: Address::Buffer(buffer),
            length,
        }
    }

    /// Mapped-direct request over the first `length` bytes of `window`.
    pub fn mapped(window: &'a MappedWindow, length: usize) -> Self {
        Self {
            address: Address::Window(window),
            length,
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.address, Address::Window(_))
    }
}

/// The six ways a request can be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPath {
    MmioPoll,
    MmioInterrupt,
    DmaPoll,
    DmaInterrupt,
    MappedPoll,
    MappedInterrupt,
}

impl TransferPath {
    /// Pick the path for a request from its addressing and the session's modes.
    pub fn resolve(mapped: bool, session: &SessionConfig) -> Self {
        use Notification::{Interrupt, Poll};
        match (mapped, session.transfer_mode(), session.notification()) {
            (true, _, Poll) => Self::MappedPoll,
            (true, _, Interrupt) => Self::MappedInterrupt,
            (false, TransferMode::Mmio, Poll) => Self::MmioPoll,
            (false, TransferMode::Mmio, Interrupt) => Self::MmioInterrupt,
            (false, TransferMode::Dma, Poll) => Self::DmaPoll,
            (false, TransferMode::Dma, Interrupt) => Self::DmaInterrupt,
        }
    }

    pub fn notification(self) -> Notification {
        match self {
            Self::MmioPoll | Self::DmaPoll | Self::MappedPoll => Notification::Poll,
            Self::MmioInterrupt | Self::DmaInterrupt | Self::MappedInterrupt => {
                Notification::Interrupt
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MmioPoll => "MMIO/poll",
            Self::MmioInterrupt => "MMIO/interrupt",
            Self::DmaPoll => "DMA/poll",
            Self::DmaInterrupt => "DMA/interrupt",
            Self::MappedPoll => "mapped/poll",
            Self::MappedInterrupt => "mapped/interrupt",
        }
    }
}

impl std::fmt::Display for TransferPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl CryptoCard {
    /// Run one encrypt or decrypt request to completion.
    ///
    /// # Errors
    ///
    /// - [`CryptoCardError::CopyFault`] if a copied request's buffer is shorter
    ///   than `length`
    /// - [`CryptoCardError::TransferTooLarge`] if a copied request exceeds
    ///   [`MAX_STAGING`] or a mapped request exceeds its window
    /// - [`CryptoCardError::InvalidArgument`] if a mapped request's window
    ///   belongs to another card
    /// - [`CryptoCardError::DmaAllocFailed`] if no coherent buffer is available
    /// - [`CryptoCardError::Timeout`] if the card stops responding
    pub fn dispatch(
        &self,
        session: &SessionConfig,
        op: Operation,
        request: TransferRequest<'_>,
    ) -> Result<(), CryptoCardError> {
        let path = TransferPath::resolve(request.is_mapped(), session);
        let length = request.length;
        validate(&request)?;
        if let Address::Window(window) = &request.address {
            if !window.belongs_to(self.regs.bank()) {
                return Err(CryptoCardError::InvalidArgument(
                    "window was mapped from a different card".to_string(),
                ));
            }
        }

        let _guard = self
            .dispatch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        log::debug!("{} {} bytes via {}", op, length, path);
        let protocol = Protocol::new(&self.regs, &self.completion, &self.config);

        // An operation abandoned by an earlier timeout may still be running.
        // Nothing, not even the key, is written until it has drained.
        let result = protocol.wait_idle("device busy at dispatch").and_then(|()| {
            if self.completion.discard() {
                log::warn!("discarded a stale completion left by an earlier timeout");
            }
            self.regs.write_key(session.key());

            if length == 0 {
                return Ok(());
            }

            let notify = path.notification();
            match request.address {
                Address::Window(_) => protocol.mapped(op, notify, length),
                Address::Buffer(buffer) => match path {
                    TransferPath::DmaPoll | TransferPath::DmaInterrupt => {
                        stage(buffer, length, |staged| {
                            dma::transfer(&protocol, self.dma.as_ref(), op, notify, staged)
                        })
                    }
                    _ => stage(buffer, length, |staged| protocol.mmio(op, notify, staged)),
                },
            }
        });

        if let Err(e) = &result {
            log::warn!("{} via {} failed: {}", op, path, e);
        }
        result
    }
}

fn validate(request: &TransferRequest<'_>) -> Result<(), CryptoCardError> {
    match &request.address {
        Address::Buffer(buffer) => {
            if request.length > MAX_STAGING {
                return Err(CryptoCardError::TransferTooLarge {
                    length: request.length,
                    limit: MAX_STAGING,
                });
            }
            if buffer.len() < request.length {
                return Err(CryptoCardError::CopyFault {
                    expected: request.length,
                    actual: buffer.len(),
                });
            }
        }
        Address::Window(window) => {
            if request.length > window.len() {
                return Err(CryptoCardError::TransferTooLarge {
                    length: request.length,
                    limit: window.len(),
                });
            }
        }
    }
    Ok(())
}

/// Copy the caller's bytes into a driver-owned buffer, run `f`, copy the result back.
fn stage(
    buffer: &mut [u8],
    length: usize,
    f: impl FnOnce(&mut [u8]) -> Result<(), CryptoCardError>,
) -> Result<(), CryptoCardError> {
    let mut staged = buffer
        .get(..length)
        .ok_or(CryptoCardError::CopyFault {
            expected: length,
            actual: buffer.len(),
        })?
        .to_vec();

    f(&mut staged)?;

    buffer
        .get_mut(..length)
        .ok_or(CryptoCardError::CopyFault {
            expected: length,
            actual: staged.len(),
        })?
        .copy_from_slice(&staged);
    Ok(())
}
