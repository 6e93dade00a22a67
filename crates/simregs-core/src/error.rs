use thiserror::Error;

/// Error classes used for recovery policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ErrorClass {
    /// Address did not resolve to a register.
    Address,
    /// Register exists but the requested access is not permitted.
    Access,
    /// Blocking call was cancelled.
    Interrupted,
    /// Remote communication failed.
    Transport,
}

/// Failure taxonomy shared by every address-space implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegisterError {
    /// No register is mapped at the address.
    #[error("address {address:#010x} is not mapped")]
    Unmapped {
        /// Offending address.
        address: u32,
    },
    /// Address is not aligned to a 32-bit register slot.
    #[error("address {address:#010x} is not word aligned")]
    Misaligned {
        /// Offending address.
        address: u32,
    },
    /// Host write targeted a read-only register.
    #[error("register at {address:#010x} is read-only")]
    ReadOnly {
        /// Offending address.
        address: u32,
    },
    /// Bit range does not satisfy `lsb <= msb <= 31`.
    #[error("invalid bit range [{msb}:{lsb}]")]
    InvalidBitRange {
        /// Most significant bit of the requested range.
        msb: u8,
        /// Least significant bit of the requested range.
        lsb: u8,
    },
    /// Blocking wait was cancelled before its condition held.
    #[error("wait interrupted")]
    Interrupted,
    /// Remote connection failed; never reported for the direct space.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl RegisterError {
    /// Returns the recovery class for this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Unmapped { .. } | Self::Misaligned { .. } => ErrorClass::Address,
            Self::ReadOnly { .. } | Self::InvalidBitRange { .. } => ErrorClass::Access,
            Self::Interrupted => ErrorClass::Interrupted,
            Self::Transport(_) => ErrorClass::Transport,
        }
    }

    /// Errors a long-running observer loop backs off from and retries.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Builds a transport error from any displayable cause.
    #[must_use]
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }
}

/// Malformed program construction or placement failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ProgramError {
    /// More instructions than instruction-memory slots.
    #[error("program length {length} exceeds {capacity} instruction slots")]
    LengthExceeded {
        /// Requested instruction count.
        length: usize,
        /// Instruction-memory capacity.
        capacity: usize,
    },
    /// Origin is neither `-1` nor a valid slot index.
    #[error("program origin {origin} is outside -1..={max}")]
    OriginOutOfRange {
        /// Requested origin.
        origin: i32,
        /// Highest valid slot index.
        max: i32,
    },
    /// Relocatable program fits nowhere in the free slots.
    #[error("no free instruction slots for a program of length {length}")]
    NoFreeSlots {
        /// Instruction count that failed to place.
        length: usize,
    },
    /// Fixed-origin program collides with already loaded code.
    #[error("instruction slots {conflict:#010x} already occupied")]
    SlotsOccupied {
        /// Mask of the colliding slots.
        conflict: u32,
    },
}
