// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Software model of the CryptoCard.
//!
//! [`SimulatedCard`] implements the register protocol of the real card: the
//! status busy bit, the MMIO trigger, the DMA command register, interrupt
//! status/acknowledge, and an interrupt line wired into the driver's
//! handler. It also acts as the DMA allocator, with bus addresses equal to
//! host addresses, so DMA transfers run end to end.
//!
//! The transform itself is a stand-in for the card's opaque cipher: each
//! byte is XORed with `a` and then offset by `b`. It is deterministic and
//! decryption inverts encryption, which is all the driver relies on.
//!
//! The model also keeps a few counters (DMA buffers allocated/freed, writes
//! that arrived while an operation was in flight) so tests can check the
//! driver's resource and ordering guarantees.

use crate::card::CryptoCard;
use crate::config::CardConfig;
use crate::dma::{DmaAllocator, DmaRegion};
use crate::error::CryptoCardError;
use crate::opcode::Operation;
use crate::regs::{offsets, DmaCommand, InterruptStatus, RegisterBank, Status, REGISTER_SPACE};
use crate::session::KeyPair;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Identification value reported by the simulated card.
pub const SIM_IDENT: u32 = 0x0100_00ED;

/// DMA buffer accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmaStats {
    pub allocated: usize,
    pub freed: usize,
}

impl DmaStats {
    /// Buffers currently outstanding.
    pub fn live(&self) -> usize {
        self.allocated - self.freed
    }
}

/// Apply the simulated cipher to `data` in place.
pub fn transform(key: KeyPair, op: Operation, data: &mut [u8]) {
    match op {
        Operation::Encrypt => {
            for byte in data.iter_mut() {
                *byte = (*byte ^ key.a).wrapping_add(key.b);
            }
        }
        Operation::Decrypt => {
            for byte in data.iter_mut() {
                *byte = byte.wrapping_sub(key.b) ^ key.a;
            }
        }
    }
}

type IrqHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum Job {
    Mmio { offset: usize, len: usize },
    Dma { addr: u64, len: usize },
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    job: Job,
    op: Operation,
    interrupt: bool,
    key: KeyPair,
}

struct State {
    space: Vec<u8>,
    latency: Duration,
    stalled: bool,
    dead: bool,
    fail_next_alloc: bool,
    dma_regions: HashMap<u64, usize>,
    dma_stats: DmaStats,
    in_flight: bool,
    violations: usize,
    writes: usize,
    completed: usize,
    interrupts: usize,
}

impl State {
    fn get32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.space[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    fn put32(&mut self, offset: usize, value: u32) {
        self.space[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn get64(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.space[offset..offset + 8]);
        u64::from_le_bytes(bytes)
    }

    fn put64(&mut self, offset: usize, value: u64) {
        self.space[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn key(&self) -> KeyPair {
        let key = self.get32(offsets::KEY);
        KeyPair::new((key >> 8) as u8, key as u8)
    }

    fn note_write(&mut self, offset: usize) {
        self.writes += 1;
        if self.in_flight && offset != offsets::INT_ACK {
            self.violations += 1;
            log::warn!("simulated card: write to {:#x} during an operation", offset);
        }
    }
}

struct Inner {
    state: Mutex<State>,
    irq: Mutex<Option<IrqHook>>,
}

/// A CryptoCard implemented in software.
#[derive(Clone)]
pub struct SimulatedCard {
    inner: Arc<Inner>,
}

impl Default for SimulatedCard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCard {
    /// A card that completes every operation immediately.
    pub fn new() -> Self {
        let mut space = vec![0u8; REGISTER_SPACE];
        space[offsets::IDENT..offsets::IDENT + 4].copy_from_slice(&SIM_IDENT.to_le_bytes());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    space,
                    latency: Duration::ZERO,
                    stalled: false,
                    dead: false,
                    fail_next_alloc: false,
                    dma_regions: HashMap::new(),
                    dma_stats: DmaStats::default(),
                    in_flight: false,
                    violations: 0,
                    writes: 0,
                    completed: 0,
                    interrupts: 0,
                }),
                irq: Mutex::new(None),
            }),
        }
    }

    /// Complete operations `latency` after they are started, on a separate thread.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Attach a driver to this card and route its interrupt line to the driver's handler.
    pub fn attach(&self, config: CardConfig) -> Result<Arc<CryptoCard>, CryptoCardError> {
        let card = CryptoCard::attach(Arc::new(self.clone()), Arc::new(self.clone()), config)?;
        let weak = Arc::downgrade(&card);
        self.connect_irq(move || {
            if let Some(card) = weak.upgrade() {
                card.handle_interrupt();
            }
        });
        Ok(card)
    }

    /// Install the function invoked when the card raises its interrupt line.
    pub fn connect_irq(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self
            .inner
            .irq
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Stop completing newly started operations.
    pub fn set_stalled(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }

    /// Make the liveness register echo instead of complementing.
    pub fn set_dead(&self, dead: bool) {
        self.lock().dead = dead;
    }

    /// Fail the next coherent allocation.
    pub fn fail_next_dma_alloc(&self) {
        self.lock().fail_next_alloc = true;
    }

    /// Set bits in the interrupt status register without raising the line.
    pub fn raise_interrupt_status(&self, bits: u32) {
        let mut st = self.lock();
        let status = st.get32(offsets::INT_STATUS) | bits;
        st.put32(offsets::INT_STATUS, status);
    }

    /// Current value of a 32-bit register.
    pub fn register(&self, offset: usize) -> u32 {
        self.lock().get32(offset)
    }

    pub fn dma_stats(&self) -> DmaStats {
        self.lock().dma_stats
    }

    /// Register writes observed while an operation was in flight.
    pub fn protocol_violations(&self) -> usize {
        self.lock().violations
    }

    /// Total register and window writes observed.
    pub fn register_writes(&self) -> usize {
        self.lock().writes
    }

    pub fn operations_completed(&self) -> usize {
        self.lock().completed
    }

    pub fn interrupts_raised(&self) -> usize {
        self.lock().interrupts
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, pending: Pending) {
        let latency = self.lock().latency;
        if latency.is_zero() {
            self.complete(pending);
        } else {
            let card = self.clone();
            std::thread::spawn(move || {
                std::thread::sleep(latency);
                card.complete(pending);
            });
        }
    }

    fn complete(&self, pending: Pending) {
        let raise = {
            let mut st = self.lock();
            let done = match pending.job {
                Job::Mmio { offset, len } => {
                    match st.space.get_mut(offset..offset.saturating_add(len)) {
                        Some(data) => transform(pending.key, pending.op, data),
                        None => log::warn!("simulated card: MMIO range out of bounds"),
                    }
                    let status = st.get32(offsets::STATUS) & !Status::BUSY.bits();
                    st.put32(offsets::STATUS, status);
                    InterruptStatus::MMIO_DONE
                }
                Job::Dma { addr, len } => {
                    match st.dma_regions.get(&addr) {
                        Some(&size) if len <= size => {
                            // SAFETY: `addr` names a live region handed out by
                            // `alloc_coherent`; it cannot be freed while the
                            // state lock is held, and the driver does not touch
                            // it until the command register reports completion.
                            let data =
                                unsafe { std::slice::from_raw_parts_mut(addr as *mut u8, len) };
                            transform(pending.key, pending.op, data);
                        }
                        _ => log::warn!("simulated card: DMA to unmapped bus address {:#x}", addr),
                    }
                    let cmd = st.get32(offsets::DMA_CMD) & !DmaCommand::START.bits();
                    st.put32(offsets::DMA_CMD, cmd);
                    InterruptStatus::DMA_DONE
                }
            };
            st.in_flight = false;
            st.completed += 1;
            if pending.interrupt {
                let status = st.get32(offsets::INT_STATUS) | done.bits();
                st.put32(offsets::INT_STATUS, status);
                st.interrupts += 1;
            }
            pending.interrupt
        };

        if raise {
            let hook = self
                .inner
                .irq
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(hook) = hook {
                hook();
            }
        }
    }
}

impl RegisterBank for SimulatedCard {
    fn size(&self) -> usize {
        REGISTER_SPACE
    }

    fn read32(&self, offset: usize) -> u32 {
        self.lock().get32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        let pending = {
            let mut st = self.lock();
            st.note_write(offset);
            match offset {
                offsets::IDENT => None,
                offsets::LIVENESS => {
                    let echo = if st.dead { value } else { !value };
                    st.put32(offsets::LIVENESS, echo);
                    None
                }
                offsets::STATUS => {
                    let writable = (Status::DECRYPT | Status::INTERRUPT).bits();
                    let busy = st.get32(offsets::STATUS) & Status::BUSY.bits();
                    st.put32(offsets::STATUS, (value & writable) | busy);
                    None
                }
                offsets::INT_ACK => {
                    let status = st.get32(offsets::INT_STATUS) & !value;
                    st.put32(offsets::INT_STATUS, status);
                    None
                }
                offsets::TRIGGER => {
                    st.put32(offsets::TRIGGER, value);
                    let status = Status::from_bits_retain(st.get32(offsets::STATUS));
                    st.put32(offsets::STATUS, (status | Status::BUSY).bits());
                    st.in_flight = true;
                    let pending = Pending {
                        job: Job::Mmio {
                            offset: value as usize,
                            len: st.get32(offsets::DATA_LEN) as usize,
                        },
                        op: if status.contains(Status::DECRYPT) {
                            Operation::Decrypt
                        } else {
                            Operation::Encrypt
                        },
                        interrupt: status.contains(Status::INTERRUPT),
                        key: st.key(),
                    };
                    (!st.stalled).then_some(pending)
                }
                offsets::DMA_CMD => {
                    st.put32(offsets::DMA_CMD, value);
                    let cmd = DmaCommand::from_bits_retain(value);
                    if cmd.contains(DmaCommand::START) {
                        st.in_flight = true;
                        let pending = Pending {
                            job: Job::Dma {
                                addr: st.get64(offsets::DMA_ADDR),
                                len: st.get32(offsets::DMA_LEN) as usize,
                            },
                            op: if cmd.contains(DmaCommand::DECRYPT) {
                                Operation::Decrypt
                            } else {
                                Operation::Encrypt
                            },
                            interrupt: cmd.contains(DmaCommand::INTERRUPT),
                            key: st.key(),
                        };
                        (!st.stalled).then_some(pending)
                    } else {
                        None
                    }
                }
                _ => {
                    st.put32(offset, value);
                    None
                }
            }
        };

        if let Some(pending) = pending {
            self.start(pending);
        }
    }

    fn read64(&self, offset: usize) -> u64 {
        self.lock().get64(offset)
    }

    fn write64(&self, offset: usize, value: u64) {
        let mut st = self.lock();
        st.note_write(offset);
        st.put64(offset, value);
    }

    fn read_bytes(&self, offset: usize, dst: &mut [u8]) {
        dst.copy_from_slice(&self.lock().space[offset..offset + dst.len()]);
    }

    fn write_bytes(&self, offset: usize, src: &[u8]) {
        let mut st = self.lock();
        st.note_write(offset);
        st.space[offset..offset + src.len()].copy_from_slice(src);
    }
}

impl DmaAllocator for SimulatedCard {
    fn alloc_coherent(&self, len: usize) -> Result<DmaRegion, CryptoCardError> {
        let mut st = self.lock();
        if std::mem::take(&mut st.fail_next_alloc) || len == 0 {
            return Err(CryptoCardError::DmaAllocFailed(len));
        }

        let raw = Box::into_raw(vec![0u8; len].into_boxed_slice()) as *mut u8;
        let ptr = NonNull::new(raw).ok_or(CryptoCardError::DmaAllocFailed(len))?;
        let bus_addr = raw as u64;
        st.dma_regions.insert(bus_addr, len);
        st.dma_stats.allocated += 1;

        // SAFETY: `ptr` is a fresh heap allocation of `len` bytes, released
        // only by `free_coherent`; the bus address is the host address.
        Ok(unsafe { DmaRegion::from_raw_parts(ptr, len, bus_addr) })
    }

    fn free_coherent(&self, region: DmaRegion) {
        let mut st = self.lock();
        if st.dma_regions.remove(&region.bus_addr()).is_none() {
            log::warn!(
                "simulated card: free of unknown DMA region {:#x}",
                region.bus_addr()
            );
            return;
        }
        st.dma_stats.freed += 1;
        // SAFETY: the region was produced by `alloc_coherent` from a boxed
        // slice of exactly this length and has not been freed before.
        drop(unsafe {
            Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                region.as_ptr(),
                region.len(),
            ))
        });
    }
}

impl std::fmt::Debug for SimulatedCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.lock();
        f.debug_struct("SimulatedCard")
            .field("latency", &st.latency)
            .field("stalled", &st.stalled)
            .field("dma_stats", &st.dma_stats)
            .field("completed", &st.completed)
            .finish_non_exhaustive()
    }
}
