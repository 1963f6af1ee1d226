use std::fmt;

use hashforge_search::Predicate;
use thiserror::Error;

use crate::hasher::Digest;

/// Errors decoding a compact (`nBits`) target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TargetError {
    /// The sign bit is set on a non-zero mantissa.
    #[error("compact target {bits:#010x} is negative")]
    Negative {
        /// Raw compact value.
        bits: u32,
    },
    /// The expanded value does not fit in 256 bits.
    #[error("compact target {bits:#010x} overflows 256 bits")]
    Overflow {
        /// Raw compact value.
        bits: u32,
    },
}

/// 256-bit difficulty threshold, stored little-endian like the digests it is compared against.
///
/// A digest meets the target when, read as a little-endian integer, it is less than or equal to
/// the target.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target([u8; 32]);

impl Target {
    /// Target that every digest meets.
    pub const MAX: Self = Self([0xff; 32]);

    /// Wrap 32 little-endian bytes.
    pub const fn from_le_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Little-endian bytes.
    pub const fn to_le_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Expand a compact `nBits` encoding: `mantissa * 256^(exponent - 3)`.
    pub fn from_compact(bits: u32) -> Result<Self, TargetError> {
        let exponent = (bits >> 24) as usize;
        let mut mantissa = bits & 0x007f_ffff;

        if mantissa != 0 && bits & 0x0080_0000 != 0 {
            return Err(TargetError::Negative { bits });
        }
        if mantissa != 0
            && (exponent > 34
                || (mantissa > 0xff && exponent > 33)
                || (mantissa > 0xffff && exponent > 32))
        {
            return Err(TargetError::Overflow { bits });
        }

        let mut out = [0u8; 32];
        if exponent <= 3 {
            mantissa >>= 8 * (3 - exponent);
            out[..4].copy_from_slice(&mantissa.to_le_bytes());
        } else {
            for (i, byte) in mantissa.to_le_bytes().into_iter().take(3).enumerate() {
                if let Some(slot) = out.get_mut(exponent - 3 + i) {
                    *slot = byte;
                }
            }
        }
        Ok(Self(out))
    }

    /// Target requiring the top `zero_bits` bits of the digest to be zero.
    ///
    /// `0` accepts everything; `256` or more accepts only the all-zero digest.
    pub fn from_leading_zero_bits(zero_bits: u32) -> Self {
        let mut out = [0xffu8; 32];
        let zero_bits = zero_bits.min(256) as usize;
        let full = zero_bits / 8;
        for byte in out.iter_mut().rev().take(full) {
            *byte = 0;
        }
        if full < 32 {
            out[31 - full] = 0xff >> (zero_bits % 8);
        }
        Self(out)
    }

    /// Whether `digest` is at or below this target.
    pub fn is_met_by(&self, digest: &Digest) -> bool {
        digest.iter().rev().cmp(self.0.iter().rev()).is_le()
    }
}

impl Predicate<Digest> for Target {
    fn accept(&self, digest: &Digest) -> bool {
        self.is_met_by(digest)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({self})")
    }
}

/// Big-endian hex, the way block explorers print targets.
impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::header_hash;

    #[test]
    fn difficulty_one_compact_target() {
        let target = Target::from_compact(0x1d00_ffff).unwrap();
        assert_eq!(
            target.to_string(),
            "00000000ffff0000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn small_exponents_shift_the_mantissa() {
        let target = Target::from_compact(0x0212_3456).unwrap();
        let mut expected = [0u8; 32];
        expected[0] = 0x34;
        expected[1] = 0x12;
        assert_eq!(target, Target::from_le_bytes(expected));
    }

    #[test]
    fn invalid_compact_targets() {
        assert_eq!(
            Target::from_compact(0x0480_0001),
            Err(TargetError::Negative { bits: 0x0480_0001 })
        );
        assert_eq!(
            Target::from_compact(0x2301_0000),
            Err(TargetError::Overflow { bits: 0x2301_0000 })
        );
        // Sign bit with a zero mantissa is just zero.
        assert_eq!(
            Target::from_compact(0x0480_0000),
            Ok(Target::from_le_bytes([0; 32]))
        );
    }

    #[test]
    fn leading_zero_bits() {
        assert_eq!(Target::from_leading_zero_bits(0), Target::MAX);
        assert_eq!(
            Target::from_leading_zero_bits(12).to_string(),
            format!("000f{}", "f".repeat(60))
        );
        assert_eq!(
            Target::from_leading_zero_bits(300),
            Target::from_le_bytes([0; 32])
        );
    }

    #[test]
    fn comparison_reads_most_significant_byte_last() {
        let target = Target::from_leading_zero_bits(8);

        let mut digest = [0xffu8; 32];
        digest[31] = 0x00;
        assert!(target.is_met_by(&digest));

        digest[31] = 0x01;
        digest[0] = 0x00;
        assert!(!target.is_met_by(&digest));

        let exact = target.to_le_bytes();
        assert!(target.accept(&exact));
    }

    #[test]
    fn genesis_block_meets_its_target() {
        let header = hex::decode("0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c").unwrap();
        let target = Target::from_compact(0x1d00_ffff).unwrap();

        assert!(target.is_met_by(&header_hash(&header, 2_083_236_893).unwrap()));
        assert!(!target.is_met_by(&header_hash(&header, 0).unwrap()));
    }
}
