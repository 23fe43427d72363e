//! Hash strategies
//!
//! The boxer never calls a hash function directly; it holds a
//! `HashFunction` so tests can substitute a corrupting hash and a later wire
//! version can move to a different algorithm.
//!
//! - `Sha256Hash`: the V1 header/body hash
//! - `Blake3Hash`: alternative 32-byte hash

use sha2::{Digest, Sha256};

pub trait HashFunction: Send + Sync + std::fmt::Debug {
    /// Short algorithm name, used in logs.
    fn name(&self) -> &'static str;

    fn digest(&self, data: &[u8]) -> Vec<u8>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hash;

impl HashFunction for Sha256Hash {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hash;

impl HashFunction for Blake3Hash {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        blake3::hash(data).as_bytes().to_vec()
    }
}

/// Constant-time comparison to prevent timing side channels.
/// Slices of different length compare unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
