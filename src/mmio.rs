// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Memory-mapped register space of a physical card.
//!
//! On Linux the card's BAR0 is exposed as a PCI resource file
//! (`/sys/bus/pci/devices/<bdf>/resource0`); mapping it shared gives direct,
//! uncached access to the registers.
//!
//! # Platform Support
//!
//! Currently only Linux is supported. On other platforms, attempting to open
//! a region will return `CryptoCardError::PlatformNotSupported`.

use crate::error::CryptoCardError;
use crate::regs::RegisterBank;
use std::path::Path;

#[cfg(target_os = "linux")]
use crate::regs::REGISTER_SPACE;
#[cfg(target_os = "linux")]
use std::fs::File;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

// ============================================================================
// Linux Implementation
// ============================================================================

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;

    /// A mapped BAR0.
    pub struct MmioRegion {
        /// Resource file backing the mapping.
        #[allow(dead_code)]
        file: File,
        base: *mut u8,
        size: usize,
    }

    // SAFETY: the mapping is owned by this struct and valid until drop; all
    // accesses are volatile and the device tolerates them from any thread.
    unsafe impl Send for MmioRegion {}

    // SAFETY: concurrent register access is serialized by the driver's
    // dispatch lock where ordering matters; individual accesses are atomic
    // aligned loads and stores.
    unsafe impl Sync for MmioRegion {}

    impl MmioRegion {
        /// Map the register space behind a PCI resource file.
        ///
        /// # Errors
        ///
        /// Returns an error if:
        /// - The file cannot be opened (permissions, not found)
        /// - The resource is smaller than the card's register space
        /// - Memory mapping fails
        pub fn open(path: &Path) -> Result<Self, CryptoCardError> {
            let file = File::options()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        CryptoCardError::PermissionDenied(path.display().to_string())
                    } else {
                        CryptoCardError::Io(e)
                    }
                })?;

            let len = file.metadata()?.len() as usize;
            if len < REGISTER_SPACE {
                return Err(CryptoCardError::MmapFailed(format!(
                    "{} is {:#x} bytes, need {:#x}",
                    path.display(),
                    len,
                    REGISTER_SPACE
                )));
            }

            let base = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    REGISTER_SPACE,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    file.as_raw_fd(),
                    0,
                )
            };

            if base == libc::MAP_FAILED {
                return Err(CryptoCardError::MmapFailed(format!(
                    "mmap failed for {}: {}",
                    path.display(),
                    std::io::Error::last_os_error()
                )));
            }

            log::info!("mapped {} at {:p}", path.display(), base);

            Ok(Self {
                file,
                base: base as *mut u8,
                size: REGISTER_SPACE,
            })
        }

        #[inline]
        fn at(&self, offset: usize, width: usize) -> *mut u8 {
            debug_assert!(offset + width <= self.size, "register offset {:#x} out of range", offset);
            debug_assert!(width <= 1 || offset % width == 0, "misaligned register {:#x}", offset);
            // SAFETY: in-bounds per the assertion above and the callers' fixed offsets.
            unsafe { self.base.add(offset) }
        }
    }

    impl RegisterBank for MmioRegion {
        fn size(&self) -> usize {
            self.size
        }

        fn read32(&self, offset: usize) -> u32 {
            unsafe { std::ptr::read_volatile(self.at(offset, 4) as *const u32) }
        }

        fn write32(&self, offset: usize, value: u32) {
            unsafe { std::ptr::write_volatile(self.at(offset, 4) as *mut u32, value) }
        }

        fn read64(&self, offset: usize) -> u64 {
            unsafe { std::ptr::read_volatile(self.at(offset, 8) as *const u64) }
        }

        fn write64(&self, offset: usize, value: u64) {
            unsafe { std::ptr::write_volatile(self.at(offset, 8) as *mut u64, value) }
        }

        fn read_bytes(&self, offset: usize, dst: &mut [u8]) {
            let src = self.at(offset, 1);
            debug_assert!(offset + dst.len() <= self.size);
            for (i, byte) in dst.iter_mut().enumerate() {
                *byte = unsafe { std::ptr::read_volatile(src.add(i)) };
            }
        }

        fn write_bytes(&self, offset: usize, src: &[u8]) {
            let dst = self.at(offset, 1);
            debug_assert!(offset + src.len() <= self.size);
            for (i, byte) in src.iter().enumerate() {
                unsafe { std::ptr::write_volatile(dst.add(i), *byte) };
            }
        }
    }

    impl Drop for MmioRegion {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.base as *mut libc::c_void, self.size);
            }
        }
    }
}

// ============================================================================
// Non-Linux Stub Implementation
// ============================================================================

#[cfg(not(target_os = "linux"))]
mod stub_impl {
    use super::*;

    /// Stub region for non-Linux platforms.
    pub struct MmioRegion {
        _private: (),
    }

    impl MmioRegion {
        /// Attempting to map a region on non-Linux returns an error.
        pub fn open(_path: &Path) -> Result<Self, CryptoCardError> {
            Err(CryptoCardError::PlatformNotSupported)
        }
    }

    impl RegisterBank for MmioRegion {
        fn size(&self) -> usize {
            0
        }
        fn read32(&self, _offset: usize) -> u32 {
            0
        }
        fn write32(&self, _offset: usize, _value: u32) {}
        fn read64(&self, _offset: usize) -> u64 {
            0
        }
        fn write64(&self, _offset: usize, _value: u64) {}
        fn read_bytes(&self, _offset: usize, _dst: &mut [u8]) {}
        fn write_bytes(&self, _offset: usize, _src: &[u8]) {}
    }
}

#[cfg(target_os = "linux")]
pub use linux_impl::MmioRegion;

#[cfg(not(target_os = "linux"))]
pub use stub_impl::MmioRegion;
