//! Register access policy helpers.

use crate::RegisterError;

/// Canonical byte width of one register slot.
pub const WORD_ACCESS_BYTES: u32 = 4;

/// Host access policy of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Access {
    /// Hosts may read and write.
    ReadWrite,
    /// Hosts may only read; the simulation engine owns the value.
    ReadOnly,
}

/// Validates that `addr` names a whole 32-bit register slot.
///
/// # Errors
///
/// Returns [`RegisterError::Misaligned`] when `addr` is not a multiple of four.
pub const fn validate_word_alignment(addr: u32) -> Result<(), RegisterError> {
    if addr % WORD_ACCESS_BYTES == 0 {
        Ok(())
    } else {
        Err(RegisterError::Misaligned { address: addr })
    }
}

/// Validates a host write against the register's access policy.
///
/// # Errors
///
/// Returns [`RegisterError::ReadOnly`] for read-only registers.
pub const fn validate_write_access(access: Access, addr: u32) -> Result<(), RegisterError> {
    match access {
        Access::ReadWrite => Ok(()),
        Access::ReadOnly => Err(RegisterError::ReadOnly { address: addr }),
    }
}
