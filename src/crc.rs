//! CRC-32 as used by the PKZIP verification field.
//!
//! Two implementations sit behind [`checksum`]: crc32fast (which selects SIMD
//! or table code at runtime) and a plain table-driven version kept in this
//! module. Both are required to agree on every input.

use std::sync::LazyLock;

const POLYNOMIAL: u32 = 0xEDB8_8320;

static TABLE: LazyLock<[u32; 256]> = LazyLock::new(build_table);

fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let mut c = i as u32;
        for _ in 0..8 {
            c = if c & 1 != 0 {
                POLYNOMIAL ^ (c >> 1)
            } else {
                c >> 1
            };
        }
        *slot = c;
    }
    table
}

/// Which CRC-32 implementation to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    #[default]
    Accelerated,
    Table,
}

/// Computes the CRC-32 of `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    checksum_with(Strategy::default(), bytes)
}

/// Computes the CRC-32 of `bytes` with an explicit implementation.
pub fn checksum_with(strategy: Strategy, bytes: &[u8]) -> u32 {
    match strategy {
        Strategy::Accelerated => crc32fast::hash(bytes),
        Strategy::Table => {
            let mut hasher = Crc32::new();
            hasher.update(bytes);
            hasher.finalize()
        }
    }
}

/// Incremental table-driven CRC-32.
#[derive(Clone, Debug)]
pub struct Crc32 {
    state: u32,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    pub fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        let table = &*TABLE;
        let mut crc = self.state;
        for &b in bytes {
            crc = table[((crc ^ u32::from(b)) & 0xFF) as usize] ^ (crc >> 8);
        }
        self.state = crc;
    }

    pub fn finalize(&self) -> u32 {
        self.state ^ 0xFFFF_FFFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        for strategy in [Strategy::Accelerated, Strategy::Table] {
            assert_eq!(checksum_with(strategy, b""), 0);
            assert_eq!(checksum_with(strategy, b"123456789"), 0xCBF4_3926);
            assert_eq!(
                checksum_with(strategy, b"The quick brown fox jumps over the lazy dog"),
                0x414F_A339
            );
        }
    }

    #[test]
    fn test_table_first_entries() {
        assert_eq!(TABLE[0], 0);
        assert_eq!(TABLE[1], 0x7707_3096);
        assert_eq!(TABLE[255], 0x2D02_EF8D);
    }

    #[test]
    fn test_strategies_agree() {
        // Deterministic pseudo-random buffers of many lengths
        let mut seed = 0x1234_5678u32;
        for len in (0..2048).step_by(37) {
            let buf: Vec<u8> = (0..len)
                .map(|_| {
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                    (seed >> 16) as u8
                })
                .collect();
            assert_eq!(
                checksum_with(Strategy::Accelerated, &buf),
                checksum_with(Strategy::Table, &buf),
                "length {len}"
            );
        }
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = b"incremental crc over several chunks of input";
        let mut hasher = Crc32::new();
        for chunk in data.chunks(5) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finalize(), checksum(data));
    }
}
