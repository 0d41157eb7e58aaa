// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Basic example demonstrating the CryptoCard client API.
//!
//! Run with: `cargo run --example basic`

use cryptocard::device::first_device;
use cryptocard::{
    discover_devices, is_cryptocard_available, CardConfig, ConfigKind, CryptoCardError, Crypter,
    SimulatedCard,
};

fn main() {
    println!("CryptoCard Basic Example");
    println!("========================\n");

    // Check for hardware
    println!("Checking for CryptoCard hardware...");
    println!("  Card detected: {}", is_cryptocard_available());
    match discover_devices() {
        Ok(cards) => {
            for card in &cards {
                println!("  Card at {}", card.address);
                println!("    BAR0: {}", card.resource_path().display());
            }
        }
        Err(CryptoCardError::PlatformNotSupported) => {
            println!("  Platform not supported, hardware discovery skipped.");
        }
        Err(e) => println!("  Error discovering devices: {}", e),
    }
    match first_device() {
        Ok(card) => println!("  First card: {}", card.address),
        Err(CryptoCardError::NoDeviceFound) => println!("  No card present."),
        Err(_) => {}
    }
    println!();

    // The rest runs against the simulator
    println!("Attaching simulated card...");
    let card = match SimulatedCard::new().attach(CardConfig::default()) {
        Ok(card) => {
            println!("  Attached, ident {:#010x}", card.identification());
            card
        }
        Err(e) => {
            println!("  Failed to attach: {}", e);
            return;
        }
    };
    println!();

    let mut crypter = Crypter::create_handle(&card);
    if let Err(e) = crypter.set_key(30, 17) {
        println!("  set_key failed: {}", e);
        return;
    }

    // Small buffer on each copied path
    println!("Encrypting \"HELLO\" on each copied path...");
    for (dma, interrupt) in [(false, false), (false, true), (true, false), (true, true)] {
        let configured = crypter
            .set_config(ConfigKind::Dma, dma)
            .and_then(|()| crypter.set_config(ConfigKind::Interrupt, interrupt));
        if let Err(e) = configured {
            println!("  set_config failed: {}", e);
            return;
        }

        let mut data = *b"HELLO";
        let label = format!(
            "{}/{}",
            if dma { "DMA" } else { "MMIO" },
            if interrupt { "interrupt" } else { "poll" }
        );
        match crypter.encrypt(&mut data).and_then(|()| {
            let ciphertext = data;
            crypter.decrypt(&mut data).map(|()| ciphertext)
        }) {
            Ok(ciphertext) => println!(
                "  {:<14} ciphertext {:02x?}, round trip ok: {}",
                label,
                ciphertext,
                &data == b"HELLO"
            ),
            Err(e) => println!("  {:<14} failed: {}", label, e),
        }
    }
    println!();

    // Large buffer, split into chunks
    println!("Encrypting 100000 bytes (chunked)...");
    let original: Vec<u8> = (0..100_000).map(|i| (i & 0xFF) as u8).collect();
    let mut buffer = original.clone();
    match crypter
        .encrypt(&mut buffer)
        .and_then(|()| crypter.decrypt(&mut buffer))
    {
        Ok(()) => println!("  Round trip ok: {}", buffer == original),
        Err(e) => println!("  Chunked transfer failed: {}", e),
    }
    println!();

    // Mapped window
    println!("Mapping 4KB of the data window...");
    match crypter.map_card(4096) {
        Ok(window) => {
            let message = b"mapped hello";
            let result = window
                .write(0, message)
                .and_then(|()| crypter.encrypt_mapped(&window, message.len()))
                .and_then(|()| {
                    let mut out = [0u8; 12];
                    window.read(0, &mut out).map(|()| out)
                });
            match result {
                Ok(out) => println!("  Encrypted in place: {:02x?}", out),
                Err(e) => println!("  Mapped transfer failed: {}", e),
            }
            crypter.unmap_card(window);
        }
        Err(e) => println!("  Mapping failed: {}", e),
    }
    println!();

    crypter.close_handle();
    println!("Done!");
}
