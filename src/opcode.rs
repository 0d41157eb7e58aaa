// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Operations and control request codes.
//!
//! Request codes use the Linux `_IOW(243, nr, T)` encoding so the values match
//! what the character-device front end of the driver accepts.

use crate::error::CryptoCardError;

/// Largest chunk issued per encrypt call by the client splitter.
pub const ENCRYPT_CHUNK_SIZE: usize = 32_000;

/// Largest chunk issued per decrypt call by the client splitter.
pub const DECRYPT_CHUNK_SIZE: usize = 32_768;

/// Transform applied by the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Encrypt,
    Decrypt,
}

impl Operation {
    /// Returns true for decryption; this is the value of the operation bit.
    #[inline]
    pub const fn is_decrypt(self) -> bool {
        matches!(self, Self::Decrypt)
    }

    /// Chunk size the client splitter uses for this operation.
    pub const fn chunk_size(self) -> usize {
        match self {
            Self::Encrypt => ENCRYPT_CHUNK_SIZE,
            Self::Decrypt => DECRYPT_CHUNK_SIZE,
        }
    }

    /// Control request that carries this operation.
    pub const fn request_code(self) -> RequestCode {
        match self {
            Self::Encrypt => RequestCode::Encrypt,
            Self::Decrypt => RequestCode::Decrypt,
        }
    }

    /// Returns a human-readable name for the operation.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Encrypt => "ENCRYPT",
            Self::Decrypt => "DECRYPT",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// ioctl magic number of the CryptoCard character device.
pub const IOCTL_MAGIC: u32 = 243;

const IOC_WRITE: u32 = 1;

/// Linux `_IOW(ty, nr, size)`.
const fn iow(ty: u32, nr: u32, size: u32) -> u32 {
    (IOC_WRITE << 30) | (size << 16) | (ty << 8) | nr
}

/// Control requests accepted by a device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RequestCode {
    /// `_IOW(243, 1, struct cc_key)`
    SetKey = iow(IOCTL_MAGIC, 1, 2),
    /// `_IOW(243, 2, struct cc_config)`
    SetConfig = iow(IOCTL_MAGIC, 2, 2),
    /// `_IOW(243, 3, struct cc_op *)`
    Encrypt = iow(IOCTL_MAGIC, 3, 8),
    /// `_IOW(243, 4, struct cc_op *)`
    Decrypt = iow(IOCTL_MAGIC, 4, 8),
}

impl RequestCode {
    /// Returns the raw request value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decode a raw request value.
    pub fn from_raw(code: u32) -> Result<Self, CryptoCardError> {
        [Self::SetKey, Self::SetConfig, Self::Encrypt, Self::Decrypt]
            .into_iter()
            .find(|c| c.as_u32() == code)
            .ok_or(CryptoCardError::InvalidRequestCode(code))
    }

    /// Returns a human-readable name for the request.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SetKey => "SET_KEY",
            Self::SetConfig => "SET_CONFIG",
            Self::Encrypt => "ENCRYPT",
            Self::Decrypt => "DECRYPT",
        }
    }
}

impl std::fmt::Display for RequestCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#010x})", self.name(), self.as_u32())
    }
}
