//! # Instance Handles
//!
//! Handles are lightweight identifiers consisting of:
//! - An index into the store's slot arrays
//! - A generation counter for detecting use after removal

use std::fmt;

/// Handle to an instance in a [`SourceStore`](super::SourceStore).
///
/// The handle is split into two parts:
/// - Lower 32 bits: slot index
/// - Upper 32 bits: generation of the slot when the handle was issued
///
/// Removing an instance bumps the slot generation, so every handle issued
/// before the removal is rejected afterwards, even once the slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    /// Null/invalid handle.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates a handle from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation the handle was issued for.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Checks if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// Returns the packed representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl Default for InstanceHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("#null")
        } else {
            write!(f, "#{}v{}", self.index(), self.generation())
        }
    }
}
