//! Bloom filter for fast replay pre-checks.
//!
//! Never reports a false negative. A positive answer must be confirmed
//! against an exact set before it is treated as a replay.

use crate::error::{PodError, PodResult};

/// Fixed-size Bloom filter using double hashing over a BLAKE3 digest.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
    items: usize,
}

impl BloomFilter {
    /// Create a filter with `num_bits` bits and `num_hashes` probes per item.
    pub fn new(num_bits: usize, num_hashes: u32) -> PodResult<Self> {
        if num_bits == 0 {
            return Err(PodError::InvalidFilter("bit count must be positive".to_string()));
        }
        if num_hashes == 0 {
            return Err(PodError::InvalidFilter("hash count must be positive".to_string()));
        }
        Ok(Self {
            bits: vec![0; num_bits.div_ceil(64)],
            num_bits,
            num_hashes,
            items: 0,
        })
    }

    /// Size a filter for `capacity` items at false-positive rate `fp_rate`.
    pub fn with_capacity(capacity: usize, fp_rate: f64) -> PodResult<Self> {
        if capacity == 0 || !(fp_rate > 0.0 && fp_rate < 1.0) {
            return Err(PodError::InvalidFilter(format!(
                "capacity {} with fp rate {}",
                capacity, fp_rate
            )));
        }
        let ln2 = std::f64::consts::LN_2;
        let bits = (-(capacity as f64) * fp_rate.ln() / (ln2 * ln2)).ceil() as usize;
        let hashes = ((bits as f64 / capacity as f64) * ln2).round().max(1.0) as u32;
        Self::new(bits.max(64), hashes)
    }

    fn probes(&self, item: &[u8]) -> impl Iterator<Item = usize> + '_ {
        let digest = blake3::hash(item);
        let bytes = digest.as_bytes();
        let mut h1 = [0u8; 8];
        let mut h2 = [0u8; 8];
        h1.copy_from_slice(&bytes[0..8]);
        h2.copy_from_slice(&bytes[8..16]);
        let h1 = u64::from_le_bytes(h1);
        let h2 = u64::from_le_bytes(h2) | 1;
        let m = self.num_bits as u64;
        (0..self.num_hashes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
    }

    pub fn insert(&mut self, item: impl AsRef<[u8]>) {
        let probes: Vec<usize> = self.probes(item.as_ref()).collect();
        for bit in probes {
            self.bits[bit / 64] |= 1 << (bit % 64);
        }
        self.items += 1;
    }

    /// `false` means definitely absent.
    pub fn might_contain(&self, item: impl AsRef<[u8]>) -> bool {
        self.probes(item.as_ref())
            .all(|bit| self.bits[bit / 64] & (1 << (bit % 64)) != 0)
    }

    pub fn len(&self) -> usize {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Expected false-positive rate at the current fill.
    pub fn estimated_fp_rate(&self) -> f64 {
        let k = self.num_hashes as f64;
        let fill = 1.0 - (-k * self.items as f64 / self.num_bits as f64).exp();
        fill.powf(k)
    }
}
