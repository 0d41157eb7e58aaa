// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! High-level client API.
//!
//! [`Crypter`] is what applications use: it owns one open handle, sends
//! SET_KEY and SET_CONFIG through the raw request-code entry point, and splits
//! buffers larger than the card's data window into chunks that are sent one
//! after another as ENCRYPT or DECRYPT requests.
//!
//! # Example
//!
//! ```rust
//! use cryptocard::{CardConfig, ConfigKind, Crypter, SimulatedCard};
//!
//! # fn main() -> Result<(), cryptocard::CryptoCardError> {
//! let card = SimulatedCard::new().attach(CardConfig::default())?;
//! let mut crypter = Crypter::create_handle(&card);
//! crypter.set_key(30, 17)?;
//! crypter.set_config(ConfigKind::Dma, true)?;
//!
//! let mut data = b"HELLO".to_vec();
//! crypter.encrypt(&mut data)?;
//! crypter.decrypt(&mut data)?;
//! assert_eq!(data, b"HELLO");
//! crypter.close_handle();
//! # Ok(())
//! # }
//! ```

use crate::card::CryptoCard;
use crate::chunk::ChunkPlan;
use crate::dispatch::TransferRequest;
use crate::error::CryptoCardError;
use crate::handle::{ControlArg, DeviceHandle, MappedWindow};
use crate::opcode::{Operation, RequestCode};
use crate::session::{ConfigKind, ConfigRequest, KeyPair};
use std::sync::Arc;

/// Client session on a card.
#[derive(Debug)]
pub struct Crypter {
    handle: DeviceHandle,
}

impl Crypter {
    /// Open a new handle on `card` with a fresh session (zero key, polled MMIO).
    pub fn create_handle(card: &Arc<CryptoCard>) -> Self {
        Self {
            handle: card.open_handle(),
        }
    }

    /// Close the handle.
    pub fn close_handle(self) {
        self.handle.close();
    }

    /// The underlying handle.
    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    /// Set the key used by every later encrypt/decrypt on this handle.
    pub fn set_key(&mut self, a: u8, b: u8) -> Result<(), CryptoCardError> {
        self.handle.ioctl(
            RequestCode::SetKey.as_u32(),
            ControlArg::Key(KeyPair::new(a, b)),
        )
    }

    /// Toggle interrupt notification or DMA transfers for this handle.
    pub fn set_config(&mut self, kind: ConfigKind, value: bool) -> Result<(), CryptoCardError> {
        self.handle.ioctl(
            RequestCode::SetConfig.as_u32(),
            ControlArg::Config(ConfigRequest::new(kind, value)),
        )
    }

    /// Encrypt `data` in place, in chunks of at most 32000 bytes.
    ///
    /// The first failing chunk aborts the call; chunks already processed stay
    /// encrypted.
    pub fn encrypt(&self, data: &mut [u8]) -> Result<(), CryptoCardError> {
        self.split(Operation::Encrypt, data)
    }

    /// Decrypt `data` in place, in chunks of at most 32768 bytes.
    pub fn decrypt(&self, data: &mut [u8]) -> Result<(), CryptoCardError> {
        self.split(Operation::Decrypt, data)
    }

    /// Encrypt the first `len` bytes of a mapped window in place.
    ///
    /// Mapped requests are never split; `len` is bounded by the window.
    pub fn encrypt_mapped(&self, window: &MappedWindow, len: usize) -> Result<(), CryptoCardError> {
        self.issue(Operation::Encrypt, TransferRequest::mapped(window, len))
    }

    /// Decrypt the first `len` bytes of a mapped window in place.
    pub fn decrypt_mapped(&self, window: &MappedWindow, len: usize) -> Result<(), CryptoCardError> {
        self.issue(Operation::Decrypt, TransferRequest::mapped(window, len))
    }

    /// Map `size` bytes of the card's data window.
    pub fn map_card(&self, size: usize) -> Result<MappedWindow, CryptoCardError> {
        self.handle.map_window(size)
    }

    /// Release a window obtained from [`map_card`](Self::map_card).
    pub fn unmap_card(&self, window: MappedWindow) {
        window.unmap();
    }

    fn split(&self, op: Operation, data: &mut [u8]) -> Result<(), CryptoCardError> {
        let plan = ChunkPlan::new(data.len(), op.chunk_size());
        if plan.is_single() {
            return self.issue(op, TransferRequest::copied(data));
        }

        let count = plan.chunk_count();
        log::debug!("{} of {} bytes split into {} chunks", op, data.len(), count);
        for (index, chunk) in plan.enumerate() {
            self.issue(op, TransferRequest::copied(&mut data[chunk.range()]))
                .inspect_err(|e| {
                    log::warn!(
                        "{} chunk {}/{} at offset {} failed: {}",
                        op,
                        index + 1,
                        count,
                        chunk.offset,
                        e
                    )
                })?;
        }
        Ok(())
    }

    fn issue(&self, op: Operation, request: TransferRequest<'_>) -> Result<(), CryptoCardError> {
        match op {
            Operation::Encrypt => self.handle.encrypt(request),
            Operation::Decrypt => self.handle.decrypt(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CardConfig;
    use crate::opcode::{DECRYPT_CHUNK_SIZE, ENCRYPT_CHUNK_SIZE};
    use crate::regs::{offsets, MAX_WINDOW};
    use crate::session::{Notification, TransferMode};
    use crate::sim::{self, SimulatedCard};

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_hello_scenario() {
        let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();
        let mut crypter = Crypter::create_handle(&card);
        crypter.set_key(30, 17).unwrap();
        crypter.set_config(ConfigKind::Dma, false).unwrap();
        crypter.set_config(ConfigKind::Interrupt, false).unwrap();

        let mut data = *b"HELLO";
        crypter.encrypt(&mut data).unwrap();

        let mut expected = *b"HELLO";
        sim::transform(KeyPair::new(30, 17), Operation::Encrypt, &mut expected);
        assert_eq!(data, expected);
        assert_ne!(&data, b"HELLO");
    }

    #[test]
    fn test_set_config_updates_session() {
        let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();
        let mut crypter = Crypter::create_handle(&card);
        crypter.set_config(ConfigKind::Dma, true).unwrap();
        crypter.set_config(ConfigKind::Interrupt, true).unwrap();
        assert_eq!(crypter.handle().session().transfer_mode(), TransferMode::Dma);
        assert_eq!(crypter.handle().session().notification(), Notification::Interrupt);
    }

    #[test]
    fn test_encrypt_issues_one_operation_per_chunk() {
        let sim = SimulatedCard::new();
        let card = sim.attach(CardConfig::default()).unwrap();
        let mut crypter = Crypter::create_handle(&card);
        crypter.set_key(5, 9).unwrap();

        let mut data = pattern(2 * ENCRYPT_CHUNK_SIZE + 1);
        let original = data.clone();
        crypter.encrypt(&mut data).unwrap();
        assert_eq!(sim.operations_completed(), 3);

        let mut expected = original.clone();
        sim::transform(KeyPair::new(5, 9), Operation::Encrypt, &mut expected);
        assert_eq!(data, expected);
    }

    #[test]
    fn test_decrypt_uses_its_own_chunk_size() {
        let sim = SimulatedCard::new();
        let card = sim.attach(CardConfig::default()).unwrap();
        let mut crypter = Crypter::create_handle(&card);
        crypter.set_key(200, 1).unwrap();

        let original = pattern(2 * DECRYPT_CHUNK_SIZE);
        let mut data = original.clone();
        crypter.encrypt(&mut data).unwrap();
        let after_encrypt = sim.operations_completed();
        assert_eq!(after_encrypt, 3);

        crypter.decrypt(&mut data).unwrap();
        assert_eq!(sim.operations_completed() - after_encrypt, 2);
        assert_eq!(data, original);
    }

    #[test]
    fn test_failing_chunk_aborts_remaining() {
        let sim = SimulatedCard::new();
        let card = sim.attach(CardConfig::default()).unwrap();
        let mut crypter = Crypter::create_handle(&card);
        crypter.set_key(1, 2).unwrap();
        crypter.set_config(ConfigKind::Dma, true).unwrap();

        let original = pattern(ENCRYPT_CHUNK_SIZE * 2);
        let mut data = original.clone();
        sim.fail_next_dma_alloc();
        let err = crypter.encrypt(&mut data).unwrap_err();
        assert!(matches!(err, CryptoCardError::DmaAllocFailed(_)));
        assert_eq!(sim.operations_completed(), 0);
        assert_eq!(data, original);
    }

    #[test]
    fn test_mapped_round_trip() {
        let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();
        let mut crypter = Crypter::create_handle(&card);
        crypter.set_key(30, 17).unwrap();

        let window = crypter.map_card(64).unwrap();
        window.write(0, b"HELLO").unwrap();
        crypter.encrypt_mapped(&window, 5).unwrap();

        let mut out = [0u8; 5];
        window.read(0, &mut out).unwrap();
        let mut expected = *b"HELLO";
        sim::transform(KeyPair::new(30, 17), Operation::Encrypt, &mut expected);
        assert_eq!(out, expected);

        crypter.decrypt_mapped(&window, 5).unwrap();
        window.read(0, &mut out).unwrap();
        assert_eq!(&out, b"HELLO");
        crypter.unmap_card(window);
    }

    #[test]
    fn test_mapped_decrypt_then_encrypt() {
        let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();
        let mut crypter = Crypter::create_handle(&card);
        crypter.set_key(0x42, 0x99).unwrap();
        crypter.set_config(ConfigKind::Interrupt, true).unwrap();

        let original = pattern(300);
        let window = crypter.map_card(original.len()).unwrap();
        window.write(0, &original).unwrap();
        crypter.decrypt_mapped(&window, original.len()).unwrap();
        crypter.encrypt_mapped(&window, original.len()).unwrap();

        let mut out = vec![0u8; original.len()];
        window.read(0, &mut out).unwrap();
        assert_eq!(out, original);
    }

    #[test]
    fn test_map_card_bound() {
        let sim = SimulatedCard::new();
        let card = sim.attach(CardConfig::default()).unwrap();
        let crypter = Crypter::create_handle(&card);

        let window = crypter.map_card(MAX_WINDOW).unwrap();
        assert_eq!(window.len(), 0x10_0000 - offsets::DATA);
        assert!(matches!(
            crypter.map_card(MAX_WINDOW + 1),
            Err(CryptoCardError::WindowTooLarge { .. })
        ));
    }

    #[test]
    fn test_close_handle_releases() {
        let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();
        let crypter = Crypter::create_handle(&card);
        assert_eq!(card.open_handles(), 1);
        crypter.close_handle();
        assert_eq!(card.open_handles(), 0);
    }
}
