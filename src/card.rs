// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! The attached device.
//!
//! A [`CryptoCard`] owns everything that exists once per device: the register
//! map, the completion signal, the dispatch lock that serializes transfers,
//! and the DMA allocator. Handles share it through an `Arc`.

use crate::completion::CompletionSignal;
use crate::config::CardConfig;
use crate::dma::DmaAllocator;
use crate::error::CryptoCardError;
use crate::handle::{DeviceHandle, MappedWindow};
use crate::regs::{RegisterBank, RegisterMap, LIVENESS_PROBE, MAX_WINDOW};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Outcome of [`CryptoCard::handle_interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The card had a pending interrupt; it was acknowledged and the waiter released.
    Handled,
    /// Nothing pending on the card.
    None,
}

/// An attached CryptoCard.
pub struct CryptoCard {
    pub(crate) regs: RegisterMap,
    pub(crate) completion: CompletionSignal,
    pub(crate) dispatch_lock: Mutex<()>,
    pub(crate) dma: Arc<dyn DmaAllocator>,
    pub(crate) config: CardConfig,
    ident: u32,
    open_handles: AtomicUsize,
}

impl CryptoCard {
    /// Attach to a card reachable through `bank`.
    ///
    /// Reads the identification register and, unless disabled in `config`,
    /// runs the liveness handshake: the card must read back the complement
    /// of [`LIVENESS_PROBE`].
    ///
    /// The platform is responsible for routing the card's interrupt line to
    /// [`handle_interrupt`](Self::handle_interrupt).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoCardError::DeviceNotLive`] if the handshake fails.
    pub fn attach(
        bank: Arc<dyn RegisterBank>,
        dma: Arc<dyn DmaAllocator>,
        config: CardConfig,
    ) -> Result<Arc<Self>, CryptoCardError> {
        let regs = RegisterMap::new(bank);
        let ident = regs.identification();

        if config.check_liveness {
            let read = regs.probe_liveness();
            if read != !LIVENESS_PROBE {
                return Err(CryptoCardError::DeviceNotLive { read });
            }
        }

        log::info!(
            "CryptoCard attached: ident={:#010x}, register space {:#x} bytes",
            ident,
            regs.bank().size()
        );

        Ok(Arc::new(Self {
            regs,
            completion: CompletionSignal::new(),
            dispatch_lock: Mutex::new(()),
            dma,
            config,
            ident,
            open_handles: AtomicUsize::new(0),
        }))
    }

    /// Value of the identification register read at attach.
    pub fn identification(&self) -> u32 {
        self.ident
    }

    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    /// Number of handles currently open on this card.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::Acquire)
    }

    /// Open a handle with a fresh session (zero key, polled MMIO).
    pub fn open_handle(self: &Arc<Self>) -> DeviceHandle {
        let count = self.open_handles.fetch_add(1, Ordering::AcqRel) + 1;
        log::info!("handle opened ({} open)", count);
        DeviceHandle::new(Arc::clone(self))
    }

    pub(crate) fn release_handle(&self) {
        let count = self.open_handles.fetch_sub(1, Ordering::AcqRel) - 1;
        log::info!("handle closed ({} open)", count);
    }

    /// Map `size` bytes of the data window for direct access.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoCardError::WindowTooLarge`] if `size` exceeds
    /// `0x100000 - 0xA8`.
    pub fn map_window(&self, size: usize) -> Result<MappedWindow, CryptoCardError> {
        if size > MAX_WINDOW {
            return Err(CryptoCardError::WindowTooLarge {
                requested: size,
                limit: MAX_WINDOW,
            });
        }
        log::info!("mapped {} bytes of the data window", size);
        Ok(MappedWindow::new(Arc::clone(self.regs.bank()), size))
    }

    /// Interrupt handler: acknowledge at the source and release the waiter.
    ///
    /// Never takes the dispatch lock, so it may run while a requester sleeps
    /// holding it.
    pub fn handle_interrupt(&self) -> IrqReturn {
        let status = self.regs.interrupt_status();
        if status == 0 {
            return IrqReturn::None;
        }
        self.regs.ack_interrupt(status);
        self.completion.complete();
        log::trace!("IRQ handled, status={:#x}", status);
        IrqReturn::Handled
    }
}

impl std::fmt::Debug for CryptoCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoCard")
            .field("ident", &format_args!("{:#010x}", self.ident))
            .field("regs", &self.regs)
            .field("config", &self.config)
            .field("open_handles", &self.open_handles())
            .finish()
    }
}
