//! Splitting batches into bounded transactions.
//!
//! Large batch writes (reserve init, collateral config) exceed the block gas limit when sent
//! as one call, so orchestrators submit them chunk by chunk.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk size must be positive")]
    ZeroSize,

    #[error("parallel sequences differ in length: {left} vs {right}")]
    Misaligned { left: usize, right: usize },
}

const fn nonzero_or_one(n: usize) -> NonZeroUsize {
    match NonZeroUsize::new(n) {
        Some(v) => v,
        None => NonZeroUsize::MIN,
    }
}

/// A positive chunk size. Zero is rejected at construction (including when deserialized).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct ChunkSize(NonZeroUsize);

impl ChunkSize {
    /// Reserve initialization: each record deploys three proxies, so keep batches small.
    pub const RESERVE_INIT: Self = Self(nonzero_or_one(3));
    /// Collateral/borrow configuration: storage writes only.
    pub const RESERVE_CONFIGURE: Self = Self(nonzero_or_one(20));

    pub fn new(n: usize) -> Result<Self, ChunkError> {
        NonZeroUsize::new(n).map(Self).ok_or(ChunkError::ZeroSize)
    }

    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl TryFrom<usize> for ChunkSize {
    type Error = ChunkError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<ChunkSize> for usize {
    fn from(v: ChunkSize) -> Self {
        v.get()
    }
}

impl std::fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lazily split `items` into ordered chunks of `size`; the last chunk holds the remainder.
///
/// An empty slice yields no chunks.
pub fn chunks<T>(items: &[T], size: ChunkSize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.get())
}

/// Number of chunks `chunks` yields for `len` items.
pub const fn chunk_count(len: usize, size: ChunkSize) -> usize {
    len.div_ceil(size.get())
}

/// Pair two parallel sequences index by index, refusing sequences of different lengths.
pub fn zip_exact<A, B>(left: Vec<A>, right: Vec<B>) -> Result<Vec<(A, B)>, ChunkError> {
    if left.len() != right.len() {
        return Err(ChunkError::Misaligned {
            left: left.len(),
            right: right.len(),
        });
    }
    Ok(left.into_iter().zip(right).collect())
}
