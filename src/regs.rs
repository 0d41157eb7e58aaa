// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! CryptoCard register map.
//!
//! The card exposes a single 1 MiB register space (BAR0). The control block
//! occupies the first 0xA8 bytes; everything from [`offsets::DATA`] onward is the data
//! window that MMIO transfers read from and write back into.
//!
//! # Layout
//!
//! | Offset | Width | Register |
//! |--------|-------|----------|
//! | 0x00 | 4 | identification |
//! | 0x04 | 4 | liveness check (reads back the complement) |
//! | 0x08 | 4 | key, `a << 8 \| b` |
//! | 0x0C | 4 | MMIO data length |
//! | 0x20 | 4 | MMIO status |
//! | 0x24 | 4 | interrupt status |
//! | 0x64 | 4 | interrupt acknowledge |
//! | 0x80 | 4 | MMIO trigger (data address) |
//! | 0x90 | 8 | DMA bus address |
//! | 0x98 | 4 | DMA length |
//! | 0xA0 | 4 | DMA command |
//! | 0xA8 | .. | data window |

use crate::session::KeyPair;
use bitflags::bitflags;
use std::sync::Arc;

/// Register offsets relative to the device base.
pub mod offsets {
    pub const IDENT: usize = 0x00;
    pub const LIVENESS: usize = 0x04;
    pub const KEY: usize = 0x08;
    pub const DATA_LEN: usize = 0x0C;
    pub const STATUS: usize = 0x20;
    pub const INT_STATUS: usize = 0x24;
    pub const INT_ACK: usize = 0x64;
    pub const TRIGGER: usize = 0x80;
    pub const DMA_ADDR: usize = 0x90;
    pub const DMA_LEN: usize = 0x98;
    pub const DMA_CMD: usize = 0xA0;
    pub const DATA: usize = 0xA8;
}

/// Size of the device register space.
pub const REGISTER_SPACE: usize = 0x10_0000;

/// Largest window a process may map; the register bank before [`offsets::DATA`] stays hidden.
pub const MAX_WINDOW: usize = REGISTER_SPACE - offsets::DATA;

/// Value written to the liveness register during attach.
pub const LIVENESS_PROBE: u32 = 0xAAAA_AAAA;

bitflags! {
    /// MMIO status register (offset 0x20).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// Device is processing; hardware-set, writes are ignored.
        const BUSY = 1 << 0;
        /// Operation is decryption (clear for encryption).
        const DECRYPT = 1 << 1;
        /// Raise an interrupt on completion (clear for polling).
        const INTERRUPT = 1 << 7;
    }
}

bitflags! {
    /// DMA command register (offset 0xA0).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaCommand: u32 {
        /// Start the transfer; stays set while the DMA engine is busy.
        const START = 1 << 0;
        /// Operation is decryption (clear for encryption).
        const DECRYPT = 1 << 1;
        /// Raise an interrupt on completion (clear for polling).
        const INTERRUPT = 1 << 2;
    }
}

bitflags! {
    /// Interrupt status / acknowledge registers (offsets 0x24, 0x64).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptStatus: u32 {
        /// An MMIO operation completed.
        const MMIO_DONE = 0x001;
        /// A DMA operation completed.
        const DMA_DONE = 0x100;
    }
}

/// Raw access to a device register space.
///
/// Implementations must perform every access with volatile semantics: each
/// call observes or mutates live device state and may not be cached,
/// elided, or reordered with respect to other calls.
pub trait RegisterBank: Send + Sync {
    /// Size of the register space in bytes.
    fn size(&self) -> usize;

    fn read32(&self, offset: usize) -> u32;

    fn write32(&self, offset: usize, value: u32);

    fn read64(&self, offset: usize) -> u64;

    fn write64(&self, offset: usize, value: u64);

    /// Copy bytes out of the register space (`memcpy_fromio`).
    fn read_bytes(&self, offset: usize, dst: &mut [u8]);

    /// Copy bytes into the register space (`memcpy_toio`).
    fn write_bytes(&self, offset: usize, src: &[u8]);
}

/// Typed view over a CryptoCard register space.
#[derive(Clone)]
pub struct RegisterMap {
    bank: Arc<dyn RegisterBank>,
}

impl RegisterMap {
    pub fn new(bank: Arc<dyn RegisterBank>) -> Self {
        Self { bank }
    }

    /// The underlying register space.
    pub fn bank(&self) -> &Arc<dyn RegisterBank> {
        &self.bank
    }

    #[inline]
    pub fn identification(&self) -> u32 {
        self.bank.read32(offsets::IDENT)
    }

    /// Write the probe value to the liveness register and return what reads back.
    pub fn probe_liveness(&self) -> u32 {
        self.bank.write32(offsets::LIVENESS, LIVENESS_PROBE);
        self.bank.read32(offsets::LIVENESS)
    }

    #[inline]
    pub fn write_key(&self, key: KeyPair) {
        self.bank.write32(offsets::KEY, key.packed());
    }

    #[inline]
    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.bank.read32(offsets::STATUS))
    }

    /// Write the operation and notification bits; the busy bit is never written.
    #[inline]
    pub fn write_status(&self, status: Status) {
        self.bank
            .write32(offsets::STATUS, (status - Status::BUSY).bits());
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.status().contains(Status::BUSY)
    }

    #[inline]
    pub fn write_data_len(&self, len: u32) {
        self.bank.write32(offsets::DATA_LEN, len);
    }

    #[inline]
    pub fn data_len(&self) -> u32 {
        self.bank.read32(offsets::DATA_LEN)
    }

    /// Start an MMIO operation on the data window.
    #[inline]
    pub fn trigger(&self) {
        self.bank.write32(offsets::TRIGGER, offsets::DATA as u32);
    }

    /// Copy `src` into the data window at `offset` bytes past its start.
    #[inline]
    pub fn write_window(&self, offset: usize, src: &[u8]) {
        self.bank.write_bytes(offsets::DATA + offset, src);
    }

    /// Copy from the data window at `offset` bytes past its start into `dst`.
    #[inline]
    pub fn read_window(&self, offset: usize, dst: &mut [u8]) {
        self.bank.read_bytes(offsets::DATA + offset, dst);
    }

    #[inline]
    pub fn interrupt_status(&self) -> u32 {
        self.bank.read32(offsets::INT_STATUS)
    }

    #[inline]
    pub fn ack_interrupt(&self, status: u32) {
        self.bank.write32(offsets::INT_ACK, status);
    }

    /// Program the DMA descriptor registers.
    pub fn program_dma(&self, bus_addr: u64, len: u32) {
        self.bank.write32(offsets::DMA_LEN, len);
        self.bank.write64(offsets::DMA_ADDR, bus_addr);
    }

    #[inline]
    pub fn dma_command(&self) -> DmaCommand {
        DmaCommand::from_bits_retain(self.bank.read32(offsets::DMA_CMD))
    }

    #[inline]
    pub fn write_dma_command(&self, cmd: DmaCommand) {
        self.bank.write32(offsets::DMA_CMD, cmd.bits());
    }

    #[inline]
    pub fn is_dma_busy(&self) -> bool {
        self.dma_command().contains(DmaCommand::START)
    }
}

impl std::fmt::Debug for RegisterMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterMap")
            .field("size", &self.bank.size())
            .finish()
    }
}
