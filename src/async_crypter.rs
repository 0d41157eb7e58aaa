// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Async front end for [`Crypter`] (feature `async`).
//!
//! Transfers block the calling thread until the card finishes, so each call
//! runs on tokio's blocking pool. Buffers are passed by value and handed back
//! once the transfer is done.

use crate::card::CryptoCard;
use crate::crypter::Crypter;
use crate::error::CryptoCardError;
use crate::session::ConfigKind;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cloneable async handle around one [`Crypter`] session.
#[derive(Debug, Clone)]
pub struct AsyncCrypter {
    inner: Arc<RwLock<Crypter>>,
}

impl AsyncCrypter {
    pub fn create_handle(card: &Arc<CryptoCard>) -> Self {
        Self::from_crypter(Crypter::create_handle(card))
    }

    pub fn from_crypter(crypter: Crypter) -> Self {
        Self {
            inner: Arc::new(RwLock::new(crypter)),
        }
    }

    pub async fn set_key(&self, a: u8, b: u8) -> Result<(), CryptoCardError> {
        self.inner.write().await.set_key(a, b)
    }

    pub async fn set_config(&self, kind: ConfigKind, value: bool) -> Result<(), CryptoCardError> {
        self.inner.write().await.set_config(kind, value)
    }

    /// Encrypt `data`, returning the transformed buffer.
    pub async fn encrypt(&self, data: Vec<u8>) -> Result<Vec<u8>, CryptoCardError> {
        self.run(data, |crypter, buf| crypter.encrypt(buf)).await
    }

    /// Decrypt `data`, returning the transformed buffer.
    pub async fn decrypt(&self, data: Vec<u8>) -> Result<Vec<u8>, CryptoCardError> {
        self.run(data, |crypter, buf| crypter.decrypt(buf)).await
    }

    async fn run<F>(&self, mut data: Vec<u8>, f: F) -> Result<Vec<u8>, CryptoCardError>
    where
        F: FnOnce(&Crypter, &mut [u8]) -> Result<(), CryptoCardError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let crypter = inner.blocking_read();
            f(&crypter, &mut data).map(|()| data)
        })
        .await
        .map_err(|e| CryptoCardError::Io(std::io::Error::other(e)))?
    }
}
