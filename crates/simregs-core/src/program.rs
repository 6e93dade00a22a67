//! Loadable instruction sequences and their instruction-memory footprint.

use std::fmt;

use crate::{ProgramError, INSTR_MEM_SIZE};

/// Origin value marking a program the loader may place anywhere.
pub const RELOCATABLE: i32 = -1;

/// Instruction-memory slot count as a `usize`.
pub const PROGRAM_CAPACITY: usize = INSTR_MEM_SIZE as usize;

const MAX_ORIGIN: i32 = INSTR_MEM_SIZE as i32 - 1;

/// Mask of the `length` lowest bits.
const fn low_mask(length: usize) -> u32 {
    if length >= PROGRAM_CAPACITY {
        u32::MAX
    } else {
        (1 << length) - 1
    }
}

/// Immutable instruction sequence plus placement metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Program {
    instructions: Vec<u16>,
    origin: i32,
}

impl Program {
    /// Validates and builds a program.
    ///
    /// `origin` is a fixed slot `0..=31` or [`RELOCATABLE`].
    ///
    /// # Errors
    ///
    /// [`ProgramError::LengthExceeded`] for more than 32 instructions,
    /// [`ProgramError::OriginOutOfRange`] for any other origin.
    pub fn new(instructions: Vec<u16>, origin: i32) -> Result<Self, ProgramError> {
        if instructions.len() > PROGRAM_CAPACITY {
            return Err(ProgramError::LengthExceeded {
                length: instructions.len(),
                capacity: PROGRAM_CAPACITY,
            });
        }
        if !(RELOCATABLE..=MAX_ORIGIN).contains(&origin) {
            return Err(ProgramError::OriginOutOfRange {
                origin,
                max: MAX_ORIGIN,
            });
        }
        Ok(Self {
            instructions,
            origin,
        })
    }

    /// Builds a relocatable program.
    ///
    /// # Errors
    ///
    /// [`ProgramError::LengthExceeded`] for more than 32 instructions.
    pub fn relocatable(instructions: Vec<u16>) -> Result<Self, ProgramError> {
        Self::new(instructions, RELOCATABLE)
    }

    /// Requested origin, `-1` when relocatable.
    #[must_use]
    pub const fn origin(&self) -> i32 {
        self.origin
    }

    /// Returns `true` when the loader chooses the origin.
    #[must_use]
    pub const fn is_relocatable(&self) -> bool {
        self.origin == RELOCATABLE
    }

    /// Instruction count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` for a program without instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction words in program order.
    #[must_use]
    pub fn instructions(&self) -> &[u16] {
        &self.instructions
    }

    /// Instruction at `index`, if any.
    #[must_use]
    pub fn instruction(&self, index: usize) -> Option<u16> {
        self.instructions.get(index).copied()
    }

    /// Slots the program occupies.
    ///
    /// Fixed programs occupy `len` consecutive slots from `origin`, wrapping
    /// past slot 31 to slot 0. Relocatable programs report the same run
    /// anchored at slot 0.
    #[must_use]
    pub fn allocation_mask(&self) -> u32 {
        let base = low_mask(self.len());
        u32::try_from(self.origin).map_or(base, |origin| base.rotate_left(origin))
    }

    /// Chooses a load origin given the slots already in use.
    ///
    /// Fixed programs keep their origin when every slot is free.
    /// Relocatable programs take the highest offset at which they fit without
    /// wrapping.
    ///
    /// # Errors
    ///
    /// [`ProgramError::SlotsOccupied`] for a colliding fixed program,
    /// [`ProgramError::NoFreeSlots`] when a relocatable program fits nowhere.
    pub fn find_origin(&self, used_mask: u32) -> Result<u8, ProgramError> {
        if let Ok(origin) = u8::try_from(self.origin) {
            let conflict = self.allocation_mask() & used_mask;
            return if conflict == 0 {
                Ok(origin)
            } else {
                Err(ProgramError::SlotsOccupied { conflict })
            };
        }

        let base = low_mask(self.len());
        let highest = (PROGRAM_CAPACITY - self.len()).min(PROGRAM_CAPACITY - 1);
        (0..=highest)
            .rev()
            .find(|&offset| (base << offset) & used_mask == 0)
            .and_then(|offset| u8::try_from(offset).ok())
            .ok_or(ProgramError::NoFreeSlots { length: self.len() })
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Program{{origin={},length={}}}", self.origin, self.len())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::{Program, RELOCATABLE};
    use crate::ProgramError;

    #[test]
    fn rejects_programs_longer_than_instruction_memory() {
        assert_eq!(
            Program::new(vec![0; 33], 0),
            Err(ProgramError::LengthExceeded {
                length: 33,
                capacity: 32
            })
        );
        assert!(Program::new(vec![0; 32], 0).is_ok());
    }

    #[rstest]
    #[case(-2)]
    #[case(32)]
    #[case(i32::MIN)]
    fn rejects_out_of_range_origins(#[case] origin: i32) {
        assert_eq!(
            Program::new(vec![0xE001], origin),
            Err(ProgramError::OriginOutOfRange { origin, max: 31 })
        );
    }

    #[rstest]
    #[case(3, 0, 0x0000_0007)]
    #[case(3, 4, 0x0000_0070)]
    #[case(4, 30, 0xC000_0003)]
    #[case(1, 31, 0x8000_0000)]
    #[case(32, 5, 0xFFFF_FFFF)]
    #[case(0, 9, 0)]
    fn fixed_masks_wrap_circularly(#[case] length: usize, #[case] origin: i32, #[case] want: u32) {
        let program = Program::new(vec![0; length], origin).expect("valid program");
        assert_eq!(program.allocation_mask(), want);
    }

    #[test]
    fn relocatable_mask_is_anchored_at_zero() {
        let program = Program::relocatable(vec![1, 2, 3, 4, 5]).expect("valid program");
        assert!(program.is_relocatable());
        assert_eq!(program.origin(), RELOCATABLE);
        assert_eq!(program.allocation_mask(), 0b1_1111);
    }

    #[test]
    fn fixed_placement_reports_conflicts() {
        let program = Program::new(vec![0; 4], 2).expect("valid program");
        assert_eq!(program.find_origin(0x0000_0003), Ok(2));
        assert_eq!(
            program.find_origin(0x0000_0010),
            Err(ProgramError::SlotsOccupied {
                conflict: 0x0000_0010
            })
        );
    }

    #[test]
    fn relocatable_placement_prefers_highest_free_offset() {
        let program = Program::relocatable(vec![0; 4]).expect("valid program");
        assert_eq!(program.find_origin(0), Ok(28));
        assert_eq!(program.find_origin(0xF000_0000), Ok(24));
        assert_eq!(program.find_origin(0x0800_0000), Ok(28));
        assert_eq!(program.find_origin(0x1000_0000), Ok(24));
        assert_eq!(
            program.find_origin(0x8888_8888),
            Err(ProgramError::NoFreeSlots { length: 4 })
        );
    }

    #[test]
    fn accessors_and_display() {
        let program = Program::new(vec![0xA042, 0x0000], 7).expect("valid program");
        assert_eq!(program.instruction(0), Some(0xA042));
        assert_eq!(program.instruction(2), None);
        assert_eq!(program.to_string(), "Program{origin=7,length=2}");
    }

    proptest! {
        #[test]
        fn fixed_mask_has_length_bits_contiguous_from_origin(length in 0usize..=32, origin in 0i32..32) {
            let program = Program::new(vec![0; length], origin).expect("valid program");
            let mask = program.allocation_mask();
            prop_assert_eq!(mask.count_ones() as usize, length);
            for slot in 0..length {
                let bit = (origin as usize + slot) % 32;
                prop_assert!(mask & (1 << bit) != 0);
            }
        }

        #[test]
        fn found_relocatable_origin_never_collides(length in 1usize..=32, used in any::<u32>()) {
            let program = Program::relocatable(vec![0; length]).expect("valid program");
            if let Ok(origin) = program.find_origin(used) {
                let placed = program.allocation_mask() << origin;
                prop_assert_eq!(placed & used, 0);
                prop_assert!(usize::from(origin) + length <= 32);
            }
        }
    }
}
