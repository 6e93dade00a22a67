//! Bit-field extraction and insertion over 32-bit register values.

use crate::RegisterError;

/// Mask with every bit of a register set.
pub const ALL_BITS: u32 = u32::MAX;

/// Inclusive bit range `[msb:lsb]` within a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BitRange {
    msb: u8,
    lsb: u8,
}

impl BitRange {
    /// The whole register, `[31:0]`.
    pub const FULL: Self = Self { msb: 31, lsb: 0 };

    /// Validates and builds a bit range.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::InvalidBitRange`] unless `lsb <= msb <= 31`.
    pub const fn new(msb: u8, lsb: u8) -> Result<Self, RegisterError> {
        if lsb <= msb && msb <= 31 {
            Ok(Self { msb, lsb })
        } else {
            Err(RegisterError::InvalidBitRange { msb, lsb })
        }
    }

    /// Single-bit range.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::InvalidBitRange`] when `bit > 31`.
    pub const fn bit(bit: u8) -> Result<Self, RegisterError> {
        Self::new(bit, bit)
    }

    /// Most significant bit.
    #[must_use]
    pub const fn msb(self) -> u8 {
        self.msb
    }

    /// Least significant bit.
    #[must_use]
    pub const fn lsb(self) -> u8 {
        self.lsb
    }

    /// Number of bits covered.
    #[must_use]
    pub const fn width(self) -> u32 {
        (self.msb - self.lsb) as u32 + 1
    }

    /// Mask of the covered bits in register position.
    #[must_use]
    pub const fn mask(self) -> u32 {
        if self.msb - self.lsb == 31 {
            ALL_BITS
        } else {
            ((1 << self.width()) - 1) << self.lsb
        }
    }

    /// Extracts the field, right-aligned.
    ///
    /// The full-width range returns `value` untouched, which also avoids a
    /// shift by the register width.
    #[must_use]
    pub const fn extract(self, value: u32) -> u32 {
        if self.msb - self.lsb == 31 {
            value
        } else {
            (value >> self.lsb) & ((1 << self.width()) - 1)
        }
    }

    /// Replaces the field inside `word` with the low bits of `field`.
    #[must_use]
    pub const fn insert(self, word: u32, field: u32) -> u32 {
        if self.msb - self.lsb == 31 {
            field
        } else {
            let mask = self.mask();
            (word & !mask) | ((field << self.lsb) & mask)
        }
    }
}

/// Extracts bits `[msb:lsb]` of `value`.
///
/// # Errors
///
/// Returns [`RegisterError::InvalidBitRange`] unless `lsb <= msb <= 31`.
pub fn extract_bits(value: u32, msb: u8, lsb: u8) -> Result<u32, RegisterError> {
    BitRange::new(msb, lsb).map(|range| range.extract(value))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::{extract_bits, BitRange, ALL_BITS};
    use crate::RegisterError;

    #[rstest]
    #[case(0xDEAD_BEEF, 31, 0, 0xDEAD_BEEF)]
    #[case(0xDEAD_BEEF, 31, 16, 0xDEAD)]
    #[case(0xDEAD_BEEF, 15, 0, 0xBEEF)]
    #[case(0xDEAD_BEEF, 7, 4, 0xE)]
    #[case(0x8000_0000, 31, 31, 1)]
    #[case(0x0000_0001, 0, 0, 1)]
    #[case(0xFFFF_FFFF, 30, 0, 0x7FFF_FFFF)]
    fn extracts_known_fields(#[case] value: u32, #[case] msb: u8, #[case] lsb: u8, #[case] want: u32) {
        assert_eq!(extract_bits(value, msb, lsb), Ok(want));
    }

    #[rstest]
    #[case(3, 4)]
    #[case(32, 0)]
    #[case(40, 33)]
    fn rejects_invalid_ranges(#[case] msb: u8, #[case] lsb: u8) {
        assert_eq!(
            BitRange::new(msb, lsb),
            Err(RegisterError::InvalidBitRange { msb, lsb })
        );
    }

    #[test]
    fn full_range_mask_is_all_bits() {
        assert_eq!(BitRange::FULL.mask(), ALL_BITS);
        assert_eq!(BitRange::FULL.width(), 32);
        assert_eq!(BitRange::FULL.insert(0x1234, 0xCAFE_F00D), 0xCAFE_F00D);
    }

    #[test]
    fn insert_preserves_neighbouring_bits() {
        let range = BitRange::new(11, 8).expect("valid range");
        assert_eq!(range.insert(0xFFFF_FFFF, 0x0), 0xFFFF_F0FF);
        assert_eq!(range.insert(0x0000_0000, 0x1F), 0x0000_0F00);
    }

    proptest! {
        #[test]
        fn extraction_matches_shift_and_mask(value in any::<u32>(), lsb in 0u8..32, span in 0u8..32) {
            let msb = lsb.saturating_add(span).min(31);
            let range = BitRange::new(msb, lsb).expect("generated range is valid");
            let got = range.extract(value);
            if msb - lsb == 31 {
                prop_assert_eq!(got, value);
            } else {
                let width = u32::from(msb - lsb) + 1;
                prop_assert_eq!(got, (value >> lsb) & ((1u32 << width) - 1));
            }
        }

        #[test]
        fn insert_then_extract_returns_truncated_field(word in any::<u32>(), field in any::<u32>(), lsb in 0u8..32, span in 0u8..32) {
            let msb = lsb.saturating_add(span).min(31);
            let range = BitRange::new(msb, lsb).expect("generated range is valid");
            let updated = range.insert(word, field);
            prop_assert_eq!(range.extract(updated), range.extract(field << lsb));
            prop_assert_eq!(updated & !range.mask(), word & !range.mask());
        }
    }
}
