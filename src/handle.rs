// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Open handles and mapped data windows.
//!
//! A [`DeviceHandle`] plays the role of an open file on the card's character
//! device: it carries its own [`SessionConfig`] and accepts the four control
//! requests, either through typed methods or through the raw
//! [`ioctl`](DeviceHandle::ioctl) entry point.

use crate::card::CryptoCard;
use crate::dispatch::TransferRequest;
use crate::error::CryptoCardError;
use crate::opcode::{Operation, RequestCode};
use crate::regs::{offsets, RegisterBank};
use crate::session::{ConfigRequest, KeyPair, SessionConfig};
use std::sync::Arc;

/// Argument carried by a raw control request.
#[derive(Debug)]
pub enum ControlArg<'a> {
    Key(KeyPair),
    Config(ConfigRequest),
    Transfer(TransferRequest<'a>),
}

impl ControlArg<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Key(_) => "key",
            Self::Config(_) => "config",
            Self::Transfer(_) => "transfer",
        }
    }
}

/// An open handle on a card.
pub struct DeviceHandle {
    card: Arc<CryptoCard>,
    session: SessionConfig,
}

impl DeviceHandle {
    pub(crate) fn new(card: Arc<CryptoCard>) -> Self {
        Self {
            card,
            session: SessionConfig::new(),
        }
    }

    /// The card this handle is open on.
    pub fn card(&self) -> &Arc<CryptoCard> {
        &self.card
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// SET_KEY: store the key used by later requests on this handle.
    pub fn set_key(&mut self, key: KeyPair) {
        self.session.set_key(key);
        log::debug!("session key set: a={} b={}", key.a, key.b);
    }

    /// SET_CONFIG: toggle the interrupt or DMA flag of this handle.
    pub fn set_config(&mut self, request: ConfigRequest) {
        self.session.apply(request);
        log::debug!(
            "session config: {:?}={} -> {:?}/{:?}",
            request.kind,
            request.value,
            self.session.transfer_mode(),
            self.session.notification()
        );
    }

    /// ENCRYPT.
    pub fn encrypt(&self, request: TransferRequest<'_>) -> Result<(), CryptoCardError> {
        self.card.dispatch(&self.session, Operation::Encrypt, request)
    }

    /// DECRYPT.
    pub fn decrypt(&self, request: TransferRequest<'_>) -> Result<(), CryptoCardError> {
        self.card.dispatch(&self.session, Operation::Decrypt, request)
    }

    /// Raw control entry point.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoCardError::InvalidRequestCode`] for an unknown `code`
    /// and [`CryptoCardError::InvalidArgument`] if `arg` does not match it;
    /// neither touches the card.
    pub fn ioctl(&mut self, code: u32, arg: ControlArg<'_>) -> Result<(), CryptoCardError> {
        let request = RequestCode::from_raw(code)?;
        match (request, arg) {
            (RequestCode::SetKey, ControlArg::Key(key)) => {
                self.set_key(key);
                Ok(())
            }
            (RequestCode::SetConfig, ControlArg::Config(config)) => {
                self.set_config(config);
                Ok(())
            }
            (RequestCode::Encrypt, ControlArg::Transfer(transfer)) => self.encrypt(transfer),
            (RequestCode::Decrypt, ControlArg::Transfer(transfer)) => self.decrypt(transfer),
            (request, arg) => Err(CryptoCardError::InvalidArgument(format!(
                "{} does not take a {} argument",
                request,
                arg.name()
            ))),
        }
    }

    /// Map `size` bytes of the card's data window.
    pub fn map_window(&self, size: usize) -> Result<MappedWindow, CryptoCardError> {
        self.card.map_window(size)
    }

    /// Close the handle, discarding its session.
    pub fn close(self) {}
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.card.release_handle();
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// The card's data window mapped for direct access.
///
/// Offset 0 of the window is register offset 0xA8; the register bank in
/// front of it is not reachable through this type.
pub struct MappedWindow {
    bank: Arc<dyn RegisterBank>,
    len: usize,
}

impl MappedWindow {
    pub(crate) fn new(bank: Arc<dyn RegisterBank>, len: usize) -> Self {
        Self { bank, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if this window was mapped from the card behind `bank`.
    pub(crate) fn belongs_to(&self, bank: &Arc<dyn RegisterBank>) -> bool {
        Arc::ptr_eq(&self.bank, bank)
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), CryptoCardError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(CryptoCardError::InvalidArgument(format!(
                "range {}..{} outside {}-byte window",
                offset,
                offset.saturating_add(len),
                self.len
            ))),
        }
    }

    /// Store `src` at `offset` within the window.
    pub fn write(&self, offset: usize, src: &[u8]) -> Result<(), CryptoCardError> {
        self.check(offset, src.len())?;
        self.bank.write_bytes(offsets::DATA + offset, src);
        Ok(())
    }

    /// Load `dst.len()` bytes from `offset` within the window.
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), CryptoCardError> {
        self.check(offset, dst.len())?;
        self.bank.read_bytes(offsets::DATA + offset, dst);
        Ok(())
    }

    /// Unmap the window.
    pub fn unmap(self) {
        log::info!("unmapped {} bytes of the data window", self.len);
    }
}

impl std::fmt::Debug for MappedWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedWindow")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CardConfig;
    use crate::session::{ConfigKind, Notification, TransferMode};
    use crate::sim::SimulatedCard;

    #[test]
    fn test_sessions_are_per_handle() {
        let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();
        let mut a = card.open_handle();
        let b = card.open_handle();

        a.set_key(KeyPair::new(30, 17));
        a.set_config(ConfigRequest::new(ConfigKind::Dma, true));

        assert_eq!(a.session().transfer_mode(), TransferMode::Dma);
        assert_eq!(b.session().key(), KeyPair::default());
        assert_eq!(b.session().transfer_mode(), TransferMode::Mmio);
        assert_eq!(b.session().notification(), Notification::Poll);
    }

    #[test]
    fn test_ioctl_dispatches_by_code() {
        let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();
        let mut handle = card.open_handle();

        handle
            .ioctl(
                RequestCode::SetKey.as_u32(),
                ControlArg::Key(KeyPair::new(30, 17)),
            )
            .unwrap();
        handle
            .ioctl(
                RequestCode::SetConfig.as_u32(),
                ControlArg::Config(ConfigRequest::new(ConfigKind::Interrupt, true)),
            )
            .unwrap();
        assert!(handle.session().is_key_set());
        assert_eq!(handle.session().notification(), Notification::Interrupt);

        let mut data = *b"HELLO";
        handle
            .ioctl(
                RequestCode::Encrypt.as_u32(),
                ControlArg::Transfer(TransferRequest::copied(&mut data)),
            )
            .unwrap();
        handle
            .ioctl(
                RequestCode::Decrypt.as_u32(),
                ControlArg::Transfer(TransferRequest::copied(&mut data)),
            )
            .unwrap();
        assert_eq!(&data, b"HELLO");
    }

    #[test]
    fn test_ioctl_rejects_unknown_code_before_register_access() {
        let sim = SimulatedCard::new();
        let card = sim.attach(CardConfig::default()).unwrap();
        let mut handle = card.open_handle();
        let writes = sim.register_writes();

        let mut data = *b"HELLO";
        let err = handle
            .ioctl(
                0x4008_f3ff,
                ControlArg::Transfer(TransferRequest::copied(&mut data)),
            )
            .unwrap_err();
        assert!(matches!(err, CryptoCardError::InvalidRequestCode(0x4008_f3ff)));
        assert_eq!(sim.register_writes(), writes);
        assert_eq!(&data, b"HELLO");
    }

    #[test]
    fn test_ioctl_rejects_mismatched_argument() {
        let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();
        let mut handle = card.open_handle();
        let err = handle
            .ioctl(
                RequestCode::Encrypt.as_u32(),
                ControlArg::Key(KeyPair::new(1, 1)),
            )
            .unwrap_err();
        assert!(matches!(err, CryptoCardError::InvalidArgument(_)));
        assert!(!handle.session().is_key_set());
    }

    #[test]
    fn test_window_bounds() {
        let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();
        let window = card.map_window(8).unwrap();
        window.write(4, b"abcd").unwrap();
        assert!(window.write(5, b"abcd").is_err());
        assert!(window.read(usize::MAX, &mut [0u8; 2]).is_err());

        let mut out = [0u8; 4];
        window.read(4, &mut out).unwrap();
        assert_eq!(&out, b"abcd");
        window.unmap();
    }
}
