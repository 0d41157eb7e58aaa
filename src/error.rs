// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Error types for CryptoCard operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving a CryptoCard.
#[derive(Debug, Error)]
pub enum CryptoCardError {
    /// No CryptoCard found on the system.
    #[error("no CryptoCard device found")]
    NoDeviceFound,

    /// The liveness handshake did not read back the complement of the probe value.
    #[error("device not live: liveness register read {read:#010x}")]
    DeviceNotLive { read: u32 },

    /// Control request code is not one of SET_KEY, SET_CONFIG, ENCRYPT, DECRYPT.
    #[error("invalid request code {0:#010x}")]
    InvalidRequestCode(u32),

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller's buffer could not supply (or receive) the requested bytes.
    #[error("copy fault: request needs {expected} bytes, buffer holds {actual}")]
    CopyFault { expected: usize, actual: usize },

    /// A single transfer exceeds the staging or window limit.
    #[error("transfer of {length} bytes exceeds limit of {limit} bytes")]
    TransferTooLarge { length: usize, limit: usize },

    /// Requested mapping does not fit the device's data window.
    #[error("window of {requested} bytes exceeds limit of {limit} bytes")]
    WindowTooLarge { requested: usize, limit: usize },

    /// Coherent DMA buffer could not be allocated.
    #[error("DMA allocation of {0} bytes failed")]
    DmaAllocFailed(usize),

    /// The device did not respond within the configured bound.
    #[error("timed out after {waited:?} waiting for {stage}")]
    Timeout {
        stage: &'static str,
        waited: Duration,
    },

    /// I/O error from system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Platform not supported.
    #[error("platform not supported: CryptoCard hardware access requires Linux")]
    PlatformNotSupported,

    /// Permission denied accessing the device.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Memory mapping failed.
    #[error("mmap failed: {0}")]
    MmapFailed(String),
}

impl CryptoCardError {
    /// Returns true if this error was caused by an unresponsive device.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type alias for CryptoCard operations.
pub type CryptoCardResult<T> = Result<T, CryptoCardError>;
