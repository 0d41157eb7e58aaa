// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! End-to-end scenarios against the simulated card.

use cryptocard::regs::offsets;
use cryptocard::sim::transform;
use cryptocard::{
    CardConfig, ConfigKind, CryptoCardError, Crypter, IrqReturn, KeyPair, Operation,
    SimulatedCard, TransferRequest, DECRYPT_CHUNK_SIZE, ENCRYPT_CHUNK_SIZE,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

fn short_timeouts() -> CardConfig {
    CardConfig::default()
        .with_timeout(Duration::from_millis(50))
        .with_spin_iterations(10)
}

#[test]
fn test_hello_on_every_copied_path() {
    let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();
    let mut expected = *b"HELLO";
    transform(KeyPair::new(30, 17), Operation::Encrypt, &mut expected);

    for dma in [false, true] {
        for interrupt in [false, true] {
            let mut crypter = Crypter::create_handle(&card);
            crypter.set_key(30, 17).unwrap();
            crypter.set_config(ConfigKind::Dma, dma).unwrap();
            crypter.set_config(ConfigKind::Interrupt, interrupt).unwrap();

            let mut data = *b"HELLO";
            crypter.encrypt(&mut data).unwrap();
            assert_eq!(data, expected, "dma={} interrupt={}", dma, interrupt);
        }
    }
}

#[test]
fn test_large_buffers_round_trip() {
    let sim = SimulatedCard::new();
    let card = sim.attach(CardConfig::default()).unwrap();

    for dma in [false, true] {
        let mut crypter = Crypter::create_handle(&card);
        crypter.set_key(0x5A, 0xC3).unwrap();
        crypter.set_config(ConfigKind::Dma, dma).unwrap();

        let original = pattern(3 * DECRYPT_CHUNK_SIZE + 123, 7);
        let mut data = original.clone();
        crypter.encrypt(&mut data).unwrap();

        let mut expected = original.clone();
        transform(KeyPair::new(0x5A, 0xC3), Operation::Encrypt, &mut expected);
        assert_eq!(data, expected);

        crypter.decrypt(&mut data).unwrap();
        assert_eq!(data, original);
    }

    assert_eq!(sim.dma_stats().live(), 0);
    assert_eq!(sim.protocol_violations(), 0);
}

#[test]
fn test_chunk_counts() {
    let sim = SimulatedCard::new();
    let card = sim.attach(CardConfig::default()).unwrap();
    let crypter = Crypter::create_handle(&card);

    let mut data = vec![0u8; 2 * ENCRYPT_CHUNK_SIZE];
    crypter.encrypt(&mut data).unwrap();
    assert_eq!(sim.operations_completed(), 2);

    let mut data = vec![0u8; 2 * ENCRYPT_CHUNK_SIZE + 1];
    crypter.encrypt(&mut data).unwrap();
    assert_eq!(sim.operations_completed(), 2 + 3);
}

#[test]
fn test_concurrent_sessions_serialize() {
    let sim = SimulatedCard::new().with_latency(Duration::from_micros(200));
    let card = sim.attach(CardConfig::default()).unwrap();

    let workers: Vec<_> = (0..6u8)
        .map(|i| {
            let card = Arc::clone(&card);
            thread::spawn(move || {
                let mut crypter = Crypter::create_handle(&card);
                let key = KeyPair::new(i.wrapping_mul(40), i + 1);
                crypter.set_key(key.a, key.b).unwrap();
                crypter.set_config(ConfigKind::Dma, i % 2 == 0).unwrap();
                crypter.set_config(ConfigKind::Interrupt, i % 3 == 0).unwrap();

                for round in 0..5u8 {
                    let original = pattern(1000 + i as usize * 97, round);
                    let mut data = original.clone();
                    crypter.encrypt(&mut data).unwrap();

                    let mut expected = original.clone();
                    transform(key, Operation::Encrypt, &mut expected);
                    assert_eq!(data, expected);

                    crypter.decrypt(&mut data).unwrap();
                    assert_eq!(data, original);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(sim.protocol_violations(), 0);
    assert_eq!(sim.operations_completed(), 6 * 5 * 2);
    assert_eq!(sim.dma_stats().live(), 0);
    assert_eq!(card.open_handles(), 0);
}

#[test]
fn test_dma_alloc_failure_leaves_card_untouched() {
    let sim = SimulatedCard::new();
    let card = sim.attach(CardConfig::default()).unwrap();
    let mut crypter = Crypter::create_handle(&card);
    crypter.set_config(ConfigKind::Dma, true).unwrap();

    sim.fail_next_dma_alloc();
    let mut data = *b"HELLO";
    let err = crypter.encrypt(&mut data).unwrap_err();
    assert!(matches!(err, CryptoCardError::DmaAllocFailed(5)));
    assert_eq!(sim.register(offsets::DMA_CMD), 0);
    assert_eq!(sim.register(offsets::DMA_ADDR), 0);
    assert_eq!(&data, b"HELLO");

    // The next request goes through.
    crypter.encrypt(&mut data).unwrap();
    assert_eq!(sim.dma_stats().allocated, sim.dma_stats().freed);
}

#[test]
fn test_stalled_card_times_out_on_every_path() {
    for (dma, interrupt) in [(false, false), (false, true), (true, false), (true, true)] {
        let sim = SimulatedCard::new();
        let card = sim.attach(short_timeouts()).unwrap();
        let mut crypter = Crypter::create_handle(&card);
        crypter.set_config(ConfigKind::Dma, dma).unwrap();
        crypter.set_config(ConfigKind::Interrupt, interrupt).unwrap();

        sim.set_stalled(true);
        let mut data = *b"HELLO";
        let err = crypter.encrypt(&mut data).unwrap_err();
        assert!(err.is_timeout(), "dma={} interrupt={}: {}", dma, interrupt, err);
        assert_eq!(sim.dma_stats().live(), 0);
    }
}

#[test]
fn test_stalled_mapped_request_times_out() {
    let sim = SimulatedCard::new();
    let card = sim.attach(short_timeouts()).unwrap();
    let crypter = Crypter::create_handle(&card);
    let window = crypter.map_card(16).unwrap();

    sim.set_stalled(true);
    let err = crypter.encrypt_mapped(&window, 16).unwrap_err();
    assert!(matches!(err, CryptoCardError::Timeout { .. }));
}

#[test]
fn test_mapped_window_boundaries() {
    let sim = SimulatedCard::new();
    let card = sim.attach(CardConfig::default()).unwrap();
    let mut crypter = Crypter::create_handle(&card);
    crypter.set_key(9, 99).unwrap();

    let limit = 0x10_0000 - 0xA8;
    let window = crypter.map_card(limit).unwrap();
    assert!(matches!(
        crypter.map_card(limit + 1),
        Err(CryptoCardError::WindowTooLarge { requested, limit: l }) if requested == limit + 1 && l == limit
    ));

    // A full-window request is a single operation.
    let original = pattern(limit, 1);
    window.write(0, &original).unwrap();
    crypter.encrypt_mapped(&window, limit).unwrap();
    assert_eq!(sim.operations_completed(), 1);

    let mut out = vec![0u8; limit];
    window.read(0, &mut out).unwrap();
    let mut expected = original.clone();
    transform(KeyPair::new(9, 99), Operation::Encrypt, &mut expected);
    assert_eq!(out, expected);

    assert!(matches!(
        crypter.encrypt_mapped(&window, limit + 1),
        Err(CryptoCardError::TransferTooLarge { .. })
    ));
    crypter.unmap_card(window);
}

#[test]
fn test_copy_fault_is_reported() {
    let sim = SimulatedCard::new();
    let card = sim.attach(CardConfig::default()).unwrap();
    let handle = card.open_handle();

    let mut short = [0u8; 4];
    let mut request = TransferRequest::copied(&mut short);
    request.length = 8;
    let writes = sim.register_writes();
    assert!(matches!(
        handle.encrypt(request),
        Err(CryptoCardError::CopyFault { expected: 8, actual: 4 })
    ));
    assert_eq!(sim.register_writes(), writes);
}

#[test]
fn test_key_written_before_every_request() {
    let sim = SimulatedCard::new();
    let card = sim.attach(CardConfig::default()).unwrap();
    let mut a = Crypter::create_handle(&card);
    let mut b = Crypter::create_handle(&card);
    a.set_key(1, 2).unwrap();
    b.set_key(3, 4).unwrap();

    let mut data = *b"xyz";
    a.encrypt(&mut data).unwrap();
    assert_eq!(sim.register(offsets::KEY), 0x0102);
    b.encrypt(&mut data).unwrap();
    assert_eq!(sim.register(offsets::KEY), 0x0304);
    a.encrypt(&mut data).unwrap();
    assert_eq!(sim.register(offsets::KEY), 0x0102);
}

#[test]
fn test_interrupt_paths_raise_and_acknowledge() {
    let sim = SimulatedCard::new();
    let card = sim.attach(CardConfig::default()).unwrap();
    let mut crypter = Crypter::create_handle(&card);
    crypter.set_config(ConfigKind::Interrupt, true).unwrap();

    let mut data = *b"HELLO";
    crypter.encrypt(&mut data).unwrap();
    crypter.set_config(ConfigKind::Dma, true).unwrap();
    crypter.encrypt(&mut data).unwrap();

    assert_eq!(sim.interrupts_raised(), 2);
    assert_eq!(sim.register(offsets::INT_STATUS), 0);
}

#[test]
fn test_late_completion_does_not_reach_next_request() {
    let sim = SimulatedCard::new().with_latency(Duration::from_millis(100));
    let config = CardConfig::default()
        .with_completion_timeout(Duration::from_millis(30))
        .with_busy_timeout(Duration::from_secs(2));
    let card = sim.attach(config).unwrap();

    let mut first = Crypter::create_handle(&card);
    first.set_key(30, 17).unwrap();
    first.set_config(ConfigKind::Interrupt, true).unwrap();
    let mut abandoned = *b"AAAAA";
    let err = first.encrypt(&mut abandoned).unwrap_err();
    assert!(err.is_timeout(), "{}", err);

    // The first operation is still running on the card.
    let mut second = Crypter::create_handle(&card);
    second.set_key(1, 2).unwrap();
    let mut data = *b"HELLO";
    second.encrypt(&mut data).unwrap();

    let mut expected = *b"HELLO";
    transform(KeyPair::new(1, 2), Operation::Encrypt, &mut expected);
    assert_eq!(data, expected);
    assert_eq!(sim.operations_completed(), 2);
    assert_eq!(sim.protocol_violations(), 0);
}

#[test]
fn test_completion_while_busy_does_not_end_wait() {
    let sim = SimulatedCard::new();
    let card = sim
        .attach(CardConfig::default().with_timeout(Duration::from_millis(200)))
        .unwrap();
    let mut crypter = Crypter::create_handle(&card);
    crypter.set_config(ConfigKind::Interrupt, true).unwrap();
    sim.set_stalled(true);

    // An interrupt for some earlier operation arrives mid-wait.
    let irq = {
        let sim = sim.clone();
        let card = Arc::clone(&card);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            sim.raise_interrupt_status(0x1);
            card.handle_interrupt()
        })
    };

    let mut data = *b"HELLO";
    let err = crypter.encrypt(&mut data).unwrap_err();
    assert!(matches!(err, CryptoCardError::Timeout { .. }));
    assert_eq!(irq.join().unwrap(), IrqReturn::Handled);
    assert_eq!(&data, b"HELLO");
}

#[test]
fn test_decrypt_then_encrypt_restores_input() {
    let card = SimulatedCard::new().attach(CardConfig::default()).unwrap();

    for (dma, interrupt) in [(false, false), (false, true), (true, false), (true, true)] {
        let mut crypter = Crypter::create_handle(&card);
        crypter.set_key(0xA5, 0x3C).unwrap();
        crypter.set_config(ConfigKind::Dma, dma).unwrap();
        crypter.set_config(ConfigKind::Interrupt, interrupt).unwrap();

        let original = pattern(2 * DECRYPT_CHUNK_SIZE + 17, 42);
        let mut data = original.clone();
        crypter.decrypt(&mut data).unwrap();
        assert_ne!(data, original);
        crypter.encrypt(&mut data).unwrap();
        assert_eq!(data, original, "dma={} interrupt={}", dma, interrupt);
    }
}
