// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Coherent DMA buffers and the DMA transfer path.
//!
//! A transfer allocates a buffer sized exactly to the request, copies the
//! caller's bytes in, points the card at its bus address, and copies the
//! transformed bytes back out. The buffer is released on every exit path,
//! including timeouts, before the dispatch lock is dropped.

use crate::error::CryptoCardError;
use crate::opcode::Operation;
use crate::protocol::Protocol;
use crate::session::Notification;
use std::ptr::NonNull;

/// A device-coherent memory region and the bus address the card uses for it.
#[derive(Debug)]
pub struct DmaRegion {
    ptr: NonNull<u8>,
    len: usize,
    bus_addr: u64,
}

// SAFETY: DmaRegion is an owning handle; the memory it points to is only
// reachable through it (and through the device while a transfer is in flight).
unsafe impl Send for DmaRegion {}

impl DmaRegion {
    /// Wrap an allocator-owned region.
    ///
    /// # Safety
    ///
    /// - `ptr` must be valid for reads and writes of `len` bytes until the
    ///   region is handed back to the allocator that produced it
    /// - `bus_addr` must be the address at which the device sees `ptr`
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize, bus_addr: u64) -> Self {
        Self { ptr, len, bus_addr }
    }

    /// CPU-side address of the region.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Device-side address of the region.
    pub fn bus_addr(&self) -> u64 {
        self.bus_addr
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: guaranteed valid for `len` bytes by `from_raw_parts`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: guaranteed valid for `len` bytes by `from_raw_parts`, and
        // `&mut self` excludes other CPU-side borrows.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/// Source of coherent DMA memory for a card.
pub trait DmaAllocator: Send + Sync {
    /// Allocate a coherent region of exactly `len` bytes.
    fn alloc_coherent(&self, len: usize) -> Result<DmaRegion, CryptoCardError>;

    /// Return a region produced by [`alloc_coherent`](Self::alloc_coherent).
    fn free_coherent(&self, region: DmaRegion);
}

/// Run one DMA transfer over `data`, in place.
pub(crate) fn transfer(
    protocol: &Protocol<'_>,
    allocator: &dyn DmaAllocator,
    op: Operation,
    notify: Notification,
    data: &mut [u8],
) -> Result<(), CryptoCardError> {
    let len = u32::try_from(data.len()).map_err(|_| CryptoCardError::TransferTooLarge {
        length: data.len(),
        limit: u32::MAX as usize,
    })?;

    let region = allocator.alloc_coherent(data.len())?;
    let mut region = scopeguard::guard(region, |region| {
        log::trace!("releasing DMA buffer at {:#x}", region.bus_addr());
        allocator.free_coherent(region);
    });
    region.as_mut_slice().copy_from_slice(data);

    let regs = protocol.regs();
    regs.program_dma(region.bus_addr(), len);
    log::trace!(
        "{}: DMA buffer {:#x}, {} bytes",
        op,
        region.bus_addr(),
        len
    );

    protocol.busy_wait("DMA engine busy before start", || regs.is_dma_busy())?;

    let cmd = Protocol::dma_command_bits(op, notify);
    log::trace!("{}: DMA command {:#x}", op, cmd.bits());
    protocol.arm_completion();
    regs.write_dma_command(cmd);

    match notify {
        Notification::Poll => {
            protocol.busy_wait("DMA engine busy after start", || regs.is_dma_busy())?
        }
        Notification::Interrupt => {
            protocol.wait_for_interrupt("DMA completion interrupt", || regs.is_dma_busy())?
        }
    }

    data.copy_from_slice(region.as_slice());
    Ok(())
}
