// CryptoCard Accelerator Rust Driver
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Splitting of oversized requests into data-window sized chunks.

/// One piece of a split request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: usize,
    pub len: usize,
}

impl Chunk {
    /// Byte range of this chunk within the whole request.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Ordered chunks covering `0..total`.
///
/// All chunks are `chunk_size` long except possibly the last, which holds
/// `total % chunk_size` bytes. A zero-length request yields no chunks.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total: usize,
    chunk_size: usize,
    next: usize,
}

impl ChunkPlan {
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(total: usize, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            total,
            chunk_size,
            next: 0,
        }
    }

    /// Number of chunks the plan issues in total.
    pub fn chunk_count(&self) -> usize {
        self.total.div_ceil(self.chunk_size)
    }

    /// True if the request fits in a single chunk.
    pub fn is_single(&self) -> bool {
        self.total <= self.chunk_size
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next >= self.total {
            return None;
        }
        let offset = self.next;
        let len = self.chunk_size.min(self.total - offset);
        self.next += len;
        Some(Chunk { offset, len })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.next).div_ceil(self.chunk_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkPlan {}
