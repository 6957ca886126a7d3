//! Error types for the allocator.
//!
//! Two kinds are visible during normal operation: [`AllocError::OutOfMemory`]
//! from `allocate` (non-fatal, the caller may release blocks and retry) and
//! [`AllocError::InvalidPointer`] from `release` (a programming error; the
//! allocator's state is left untouched by the faulty call). The remaining
//! variants can only surface while constructing an allocator.
//!
//! Internal consistency violations (a header whose size disagrees with its
//! Fibonacci index, a free list out of address order) are not represented
//! here: they indicate allocator bugs and abort with a diagnostic instead.

use std::{error, fmt};

/// Result alias used throughout the crate.
pub type AllocResult<T> = Result<T, AllocError>;

/// Every failure an allocator operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// No free block can satisfy the request, even after all possible splits.
  OutOfMemory,

  /// The pointer handed to `release` is not a live allocation: outside the
  /// backing region, not on a block boundary, or already free.
  InvalidPointer,

  /// The requested backing region is too small to host a single block.
  RegionTooSmall,

  /// The operating system refused to map the backing region.
  MapFailed,
}

impl AllocError {
  /// Stable human-readable description.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::OutOfMemory => "out of memory",
      Self::InvalidPointer => "invalid pointer",
      Self::RegionTooSmall => "backing region too small",
      Self::MapFailed => "failed to map backing region",
    }
  }
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl error::Error for AllocError {}
