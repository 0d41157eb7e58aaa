// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Per-handle session configuration.
//!
//! Every open handle owns one [`SessionConfig`]. It starts with a zero key in
//! polled MMIO mode and changes only through SET_KEY / SET_CONFIG on that
//! same handle.

/// Two-byte key consumed by the card's transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyPair {
    pub a: u8,
    pub b: u8,
}

impl KeyPair {
    #[inline]
    pub const fn new(a: u8, b: u8) -> Self {
        Self { a, b }
    }

    /// Value written to the key register: `a << 8 | b`.
    #[inline]
    pub const fn packed(self) -> u32 {
        ((self.a as u32) << 8) | self.b as u32
    }
}

/// How payload bytes reach the card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransferMode {
    /// Bytes are copied through the data window.
    #[default]
    Mmio,
    /// The card reads and writes a coherent buffer by bus address.
    Dma,
}

/// How completion is observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Notification {
    /// Busy-wait on the status bit.
    #[default]
    Poll,
    /// Sleep until the completion interrupt fires.
    Interrupt,
}

/// Flag toggled by a SET_CONFIG request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigKind {
    Interrupt = 0,
    Dma = 1,
}

impl ConfigKind {
    /// Decode the `mode_int_dma` byte: 0 selects the interrupt flag, anything else DMA.
    pub fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            Self::Interrupt
        } else {
            Self::Dma
        }
    }
}

/// Argument of a SET_CONFIG request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRequest {
    pub kind: ConfigKind,
    pub value: bool,
}

impl ConfigRequest {
    pub const fn new(kind: ConfigKind, value: bool) -> Self {
        Self { kind, value }
    }
}

/// Key and mode state of one handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    key: KeyPair,
    transfer: TransferMode,
    notification: Notification,
    key_set: bool,
    config_set: bool,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key(&mut self, key: KeyPair) {
        self.key = key;
        self.key_set = true;
    }

    /// Toggle exactly one flag, leaving the other untouched.
    pub fn apply(&mut self, request: ConfigRequest) {
        match request.kind {
            ConfigKind::Interrupt => {
                self.notification = if request.value {
                    Notification::Interrupt
                } else {
                    Notification::Poll
                }
            }
            ConfigKind::Dma => {
                self.transfer = if request.value {
                    TransferMode::Dma
                } else {
                    TransferMode::Mmio
                }
            }
        }
        self.config_set = true;
    }

    #[inline]
    pub fn key(&self) -> KeyPair {
        self.key
    }

    #[inline]
    pub fn transfer_mode(&self) -> TransferMode {
        self.transfer
    }

    #[inline]
    pub fn notification(&self) -> Notification {
        self.notification
    }

    pub fn is_key_set(&self) -> bool {
        self.key_set
    }

    pub fn is_config_set(&self) -> bool {
        self.config_set
    }
}
