//! HyperLogLog sketch for approximate distinct-actor counting.
//!
//! The engine never needs exact membership, only an error-bounded distinct
//! count per (subject, day) bucket, so a fixed-size register array is enough.
//! 2^12 registers give a standard error of about 1.6% at one byte per
//! register, and two sketches over the same key space can be merged by
//! taking the register-wise maximum.
//!
//! # References
//!
//! - Flajolet et al., "HyperLogLog: the analysis of a near-optimal
//!   cardinality estimation algorithm" (AofA 2007)

use xxhash_rust::xxh3::xxh3_64_with_seed;

/// log2 of the register count.
const PRECISION: u32 = 12;

/// Number of registers.
const NUM_REGISTERS: usize = 1 << PRECISION;

/// Hash seed; fixed so sketches built by different processes agree.
const HASH_SEED: u64 = 0x7472_656e_6473;

/// Approximate distinct counter over byte-string members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    registers: Vec<u8>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperLogLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registers: vec![0; NUM_REGISTERS],
        }
    }

    /// Register one member. Re-adding a member never changes the estimate.
    pub fn insert(&mut self, member: &[u8]) {
        let hash = xxh3_64_with_seed(member, HASH_SEED);
        let index = (hash >> (64 - PRECISION)) as usize;
        // Rank of the first set bit in the remaining 64 - PRECISION bits.
        let remainder = hash << PRECISION;
        let rank = if remainder == 0 {
            (64 - PRECISION + 1) as u8
        } else {
            (remainder.leading_zeros() + 1) as u8
        };
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    /// Estimated number of distinct members inserted so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        let m = NUM_REGISTERS as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);

        let mut sum = 0.0f64;
        let mut zeros = 0u64;
        for &register in &self.registers {
            sum += 2.0f64.powi(-i32::from(register));
            if register == 0 {
                zeros += 1;
            }
        }

        let raw = alpha * m * m / sum;

        // Linear counting for the small-cardinality range.
        let estimate = if raw <= 2.5 * m && zeros > 0 {
            m * (m / zeros as f64).ln()
        } else {
            raw
        };

        estimate.round() as u64
    }

    /// Fold another sketch into this one. The result estimates the
    /// cardinality of the union of the two member sets.
    pub fn merge(&mut self, other: &Self) {
        for (own, theirs) in self.registers.iter_mut().zip(other.registers.iter()) {
            if *theirs > *own {
                *own = *theirs;
            }
        }
    }
}
