// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! # CryptoCard Accelerator Driver
//!
//! This crate drives the CryptoCard, a PCI encryption accelerator exposing a
//! 1 MiB register bank with an on-card data window. The cipher is keyed by two
//! bytes and works in place on the window contents.
//!
//! ## Transfer Paths
//!
//! Every request runs through exactly one of six paths, picked from the
//! handle's session and the request's addressing:
//!
//! | Addressing | Transfer | Notification | Path              |
//! |------------|----------|--------------|-------------------|
//! | copied     | MMIO     | poll         | `MmioPoll`        |
//! | copied     | MMIO     | interrupt    | `MmioInterrupt`   |
//! | copied     | DMA      | poll         | `DmaPoll`         |
//! | copied     | DMA      | interrupt    | `DmaInterrupt`    |
//! | mapped     | -        | poll         | `MappedPoll`      |
//! | mapped     | -        | interrupt    | `MappedInterrupt` |
//!
//! One request is in flight on a card at a time; others block at the
//! dispatcher. Every busy-wait and completion wait is bounded by
//! [`CardConfig`].
//!
//! ## Platform Support
//!
//! | Platform | Hardware card | Simulator |
//! |----------|---------------|-----------|
//! | Linux    | Supported     | Supported |
//! | Other    | Not available | Supported |
//!
//! On Linux, [`discover_devices`] finds cards by PCI ID (`1234:deba`) and
//! [`MmioRegion`] maps their BAR0. Attaching real hardware also needs a
//! [`DmaAllocator`] for coherent memory and a route from the card's interrupt
//! line to [`CryptoCard::handle_interrupt`]; both are platform specific and
//! supplied by the caller.
//!
//! [`SimulatedCard`] implements the full register protocol in software and
//! works everywhere.
//!
//! ## Example
//!
//! ```rust
//! use cryptocard::{CardConfig, ConfigKind, CryptoCardError, Crypter, SimulatedCard};
//!
//! fn main() -> Result<(), CryptoCardError> {
//!     let card = SimulatedCard::new().attach(CardConfig::default())?;
//!     let mut crypter = Crypter::create_handle(&card);
//!
//!     crypter.set_key(30, 17)?;
//!     crypter.set_config(ConfigKind::Interrupt, true)?;
//!
//!     let mut data = *b"HELLO";
//!     crypter.encrypt(&mut data)?;
//!     println!("ciphertext: {:02x?}", data);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `async`: [`AsyncCrypter`], running transfers on tokio's blocking pool.

// Module declarations
pub mod card;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod crypter;
pub mod device;
pub mod dispatch;
pub mod dma;
pub mod error;
pub mod handle;
pub mod mmio;
pub mod opcode;
pub mod protocol;
pub mod regs;
pub mod session;
pub mod sim;

#[cfg(feature = "async")]
pub mod async_crypter;

// Re-exports for convenient access
pub use card::{CryptoCard, IrqReturn};
pub use chunk::{Chunk, ChunkPlan};
pub use completion::CompletionSignal;
pub use config::CardConfig;
pub use crypter::Crypter;
pub use device::{discover_devices, is_cryptocard_available, CardInfo};
pub use dispatch::{Address, TransferPath, TransferRequest};
pub use dma::{DmaAllocator, DmaRegion};
pub use error::{CryptoCardError, CryptoCardResult};
pub use handle::{ControlArg, DeviceHandle, MappedWindow};
pub use mmio::MmioRegion;
pub use opcode::{Operation, RequestCode, DECRYPT_CHUNK_SIZE, ENCRYPT_CHUNK_SIZE};
pub use regs::{RegisterBank, RegisterMap};
pub use session::{ConfigKind, ConfigRequest, KeyPair, Notification, SessionConfig, TransferMode};
pub use sim::SimulatedCard;

#[cfg(feature = "async")]
pub use async_crypter::AsyncCrypter;
