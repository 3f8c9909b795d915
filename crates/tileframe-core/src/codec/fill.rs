//! Null sentinels per column type.

use serde::{Deserialize, Serialize};

/// Encoded null for `int64` columns.
pub const INT64_NULL: i64 = i64::MIN;

/// Bit pattern of the encoded null for `float64` columns: a quiet NaN with a
/// payload no arithmetic produces.
pub const FLOAT64_NULL_BITS: u64 = 0x7FF8_0000_0000_F111;

/// Encoded null for `bool` columns (legal bytes are 0 and 1).
pub const BOOL_NULL: u8 = 0xFF;

/// Length prefix marking a null `utf8` value. No payload follows it.
pub const UTF8_NULL_LEN: u32 = u32::MAX;

/// The set of fill sentinels an array was written with.
///
/// Persisted in the array metadata so a reader can refuse arrays whose
/// sentinels it would misinterpret.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FillValues {
    /// Null marker for `int64`.
    pub int64: i64,
    /// Null marker bits for `float64`.
    pub float64_bits: u64,
    /// Null marker byte for `bool`.
    pub bool_byte: u8,
    /// Null length prefix for `utf8`.
    pub utf8_null_len: u32,
}

impl FillValues {
    /// The sentinels this build encodes.
    pub const CURRENT: FillValues = FillValues {
        int64: INT64_NULL,
        float64_bits: FLOAT64_NULL_BITS,
        bool_byte: BOOL_NULL,
        utf8_null_len: UTF8_NULL_LEN,
    };

    /// Describe the first field that differs from `other`, if any.
    pub fn mismatch(&self, other: &FillValues) -> Option<String> {
        if self.int64 != other.int64 {
            return Some(format!("int64: {} != {}", self.int64, other.int64));
        }
        if self.float64_bits != other.float64_bits {
            return Some(format!(
                "float64: {:#018x} != {:#018x}",
                self.float64_bits, other.float64_bits
            ));
        }
        if self.bool_byte != other.bool_byte {
            return Some(format!(
                "bool: {:#04x} != {:#04x}",
                self.bool_byte, other.bool_byte
            ));
        }
        if self.utf8_null_len != other.utf8_null_len {
            return Some(format!(
                "utf8: {} != {}",
                self.utf8_null_len, other.utf8_null_len
            ));
        }
        None
    }
}

impl Default for FillValues {
    fn default() -> Self {
        FillValues::CURRENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_sentinel_is_a_nan_distinct_from_the_canonical_one() {
        let f = f64::from_bits(FLOAT64_NULL_BITS);
        assert!(f.is_nan());
        assert_ne!(f64::NAN.to_bits(), FLOAT64_NULL_BITS);
    }

    #[test]
    fn mismatch_names_the_differing_field() {
        let mut other = FillValues::CURRENT;
        assert_eq!(FillValues::CURRENT.mismatch(&other), None);
        other.bool_byte = 2;
        let msg = FillValues::CURRENT.mismatch(&other).unwrap();
        assert!(msg.starts_with("bool"), "{msg}");
    }
}
