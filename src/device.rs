// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! CryptoCard discovery.
//!
//! # Platform Support
//!
//! ## Linux
//! PCI functions appear in `/sys/bus/pci/devices/` as `dddd:bb:dd.f`
//! directories with `vendor` and `device` attribute files. A CryptoCard
//! reports vendor `0x1234`, device `0xdeba`; its BAR0 is `resource0`.
//!
//! ## Other platforms
//! Discovery returns `PlatformNotSupported`. The simulator works everywhere.

use crate::error::CryptoCardError;
use std::path::PathBuf;

#[cfg(target_os = "linux")]
use crate::mmio::MmioRegion;
#[cfg(target_os = "linux")]
use std::fs;
#[cfg(target_os = "linux")]
use std::path::Path;

/// PCI vendor ID of the CryptoCard.
pub const CRYPTOCARD_VENDOR_ID: u16 = 0x1234;

/// PCI device ID of the CryptoCard.
pub const CRYPTOCARD_DEVICE_ID: u16 = 0xDEBA;

/// Sysfs base path for PCI devices (Linux only).
#[cfg(target_os = "linux")]
const SYSFS_PCI_PATH: &str = "/sys/bus/pci/devices";

/// A CryptoCard found on the PCI bus.
#[derive(Debug, Clone)]
pub struct CardInfo {
    /// PCI address (e.g., "0000:00:04.0").
    pub address: String,
    /// Sysfs path for this function.
    pub sysfs_path: PathBuf,
}

impl CardInfo {
    /// Path of the BAR0 resource file.
    pub fn resource_path(&self) -> PathBuf {
        self.sysfs_path.join("resource0")
    }

    /// Map this card's register space.
    #[cfg(target_os = "linux")]
    pub fn map_registers(&self) -> Result<MmioRegion, CryptoCardError> {
        MmioRegion::open(&self.resource_path())
    }
}

// ============================================================================
// Linux Implementation
// ============================================================================

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;

    pub fn discover_devices() -> Result<Vec<CardInfo>, CryptoCardError> {
        let sysfs_path = Path::new(SYSFS_PCI_PATH);

        if !sysfs_path.exists() {
            return Err(CryptoCardError::PlatformNotSupported);
        }

        let mut cards = Vec::new();
        for entry in fs::read_dir(sysfs_path)? {
            let entry = entry?;
            let path = entry.path();
            let vendor = read_sysfs_hex(&path.join("vendor")).unwrap_or(0);
            let device = read_sysfs_hex(&path.join("device")).unwrap_or(0);

            if vendor == CRYPTOCARD_VENDOR_ID && device == CRYPTOCARD_DEVICE_ID {
                cards.push(CardInfo {
                    address: entry.file_name().to_string_lossy().to_string(),
                    sysfs_path: path,
                });
            }
        }

        cards.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(cards)
    }

    fn read_sysfs_hex(path: &Path) -> Result<u16, CryptoCardError> {
        let s = fs::read_to_string(path)?;
        parse_hex_id(s.trim())
    }

    pub fn is_cryptocard_available() -> bool {
        discover_devices()
            .map(|cards| !cards.is_empty())
            .unwrap_or(false)
    }
}

// ============================================================================
// Unsupported Platform Stub
// ============================================================================

#[cfg(not(target_os = "linux"))]
mod stub_impl {
    use super::*;

    pub fn discover_devices() -> Result<Vec<CardInfo>, CryptoCardError> {
        Err(CryptoCardError::PlatformNotSupported)
    }

    pub fn is_cryptocard_available() -> bool {
        false
    }
}

/// Parse a sysfs ID attribute such as `0x1234`.
fn parse_hex_id(s: &str) -> Result<u16, CryptoCardError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u16::from_str_radix(digits, 16)
        .map_err(|_| CryptoCardError::InvalidArgument(format!("invalid PCI id in sysfs: {}", s)))
}

// ============================================================================
// Public API
// ============================================================================

/// Discover all CryptoCards on the system.
///
/// # Errors
///
/// Returns an error if:
/// - The platform is not supported
/// - The sysfs PCI path doesn't exist
/// - Failed to read the device directory
#[cfg(target_os = "linux")]
pub fn discover_devices() -> Result<Vec<CardInfo>, CryptoCardError> {
    linux_impl::discover_devices()
}

#[cfg(not(target_os = "linux"))]
pub fn discover_devices() -> Result<Vec<CardInfo>, CryptoCardError> {
    stub_impl::discover_devices()
}

/// Check if a CryptoCard is present on this system.
#[cfg(target_os = "linux")]
pub fn is_cryptocard_available() -> bool {
    linux_impl::is_cryptocard_available()
}

#[cfg(not(target_os = "linux"))]
pub fn is_cryptocard_available() -> bool {
    stub_impl::is_cryptocard_available()
}

/// Discover the first CryptoCard.
pub fn first_device() -> Result<CardInfo, CryptoCardError> {
    discover_devices()?
        .into_iter()
        .next()
        .ok_or(CryptoCardError::NoDeviceFound)
}
