//! Per-block metadata.
//!
//! One header sits immediately before each block's payload, whether the
//! block is free or allocated:
//!
//! ```text
//!   ┌──────────────────┬─────────────────────────┐
//!   │   BlockHeader    │        payload          │
//!   │  (HEADER_SIZE)   │  size - HEADER_SIZE     │
//!   └──────────────────┴─────────────────────────┘
//!   ▲                  ▲
//!   │                  └── pointer returned to the user
//!   └── block base (free-list links point here)
//! ```
//!
//! Block footprints are Fibonacci numbers, so block bases land on arbitrary
//! byte offsets. Headers are therefore copied in and out with unaligned
//! loads and stores; nothing ever takes a reference into the region.

use std::{mem, ptr};

/// Bytes of metadata in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// `is_free` value of a block on the free list.
pub(crate) const BLOCK_FREE: u8 = 1;

/// `is_free` value of a block handed out to a caller.
pub(crate) const BLOCK_USED: u8 = 0;

/// Metadata preceding every block.
///
/// `size` is the total footprint in bytes, header included, and always
/// equals the Fibonacci value at `fib_index`. `req_size` records what the
/// caller actually asked for on the most recent allocation and is zero
/// while the block is free. `next` and `prev` thread the block into the
/// free list and are meaningful only while `is_free` is set; an allocated
/// block's links are cleared when it is handed out.
///
/// Sizes are tracked as `u32`, which caps a single heap at 4 GiB.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub(crate) struct BlockHeader {
  pub size: u32,
  pub req_size: u32,
  pub fib_index: u16,
  pub is_free: u8,
  pub next: *mut u8,
  pub prev: *mut u8,
}

#[cfg(target_pointer_width = "64")]
const _: () = assert!(HEADER_SIZE == 32);

impl BlockHeader {
  /// A header for a freshly created free block with detached links.
  pub fn free(
    size: u32,
    fib_index: u16,
  ) -> Self {
    Self {
      size,
      req_size: 0,
      fib_index,
      is_free: BLOCK_FREE,
      next: ptr::null_mut(),
      prev: ptr::null_mut(),
    }
  }

  /// Copies the header out of the region at `base`.
  ///
  /// # Safety
  ///
  /// `base` must point at least `HEADER_SIZE` readable bytes inside the
  /// backing region. The bytes need not hold a header the allocator wrote;
  /// callers validating foreign pointers read first and judge after.
  pub unsafe fn read(base: *mut u8) -> Self {
    unsafe { ptr::read_unaligned(base as *const BlockHeader) }
  }

  /// Copies the header into the region at `base`.
  ///
  /// # Safety
  ///
  /// `base` must point at least `HEADER_SIZE` writable bytes inside the
  /// backing region.
  pub unsafe fn write(
    &self,
    base: *mut u8,
  ) {
    unsafe { ptr::write_unaligned(base as *mut BlockHeader, *self) }
  }
}

/// The payload address of the block based at `base`.
///
/// # Safety
///
/// `base + HEADER_SIZE` must stay within the block's footprint.
pub(crate) unsafe fn payload_of(base: *mut u8) -> *mut u8 {
  unsafe { base.add(HEADER_SIZE) }
}

/// The block base a payload pointer belongs to.
///
/// # Safety
///
/// `payload` must lie at least `HEADER_SIZE` bytes into the backing region.
pub(crate) unsafe fn base_of(payload: *mut u8) -> *mut u8 {
  unsafe { payload.sub(HEADER_SIZE) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn free_header_starts_detached() {
    let header = BlockHeader::free(55, 8);

    assert_eq!(header.size, 55);
    assert_eq!(header.fib_index, 8);
    assert_eq!(header.req_size, 0);
    assert_eq!(header.is_free, BLOCK_FREE);
    assert!(header.next.is_null());
    assert!(header.prev.is_null());
  }

  #[test]
  fn header_survives_a_round_trip_at_an_odd_offset() {
    // Fibonacci footprints place headers at unaligned addresses; offset 3
    // exercises the unaligned load/store pair.
    let mut buffer = vec![0u8; 64];
    let base = unsafe { buffer.as_mut_ptr().add(3) };

    let mut header = BlockHeader::free(89, 9);
    header.req_size = 17;
    header.is_free = BLOCK_USED;

    unsafe {
      header.write(base);
      let back = BlockHeader::read(base);

      assert_eq!(back.size, 89);
      assert_eq!(back.req_size, 17);
      assert_eq!(back.fib_index, 9);
      assert_eq!(back.is_free, BLOCK_USED);
      assert!(back.next.is_null());
      assert!(back.prev.is_null());
    }
  }

  #[test]
  fn payload_and_base_are_inverses() {
    let mut buffer = vec![0u8; 64];
    let base = buffer.as_mut_ptr();

    unsafe {
      let payload = payload_of(base);
      assert_eq!(payload as usize - base as usize, HEADER_SIZE);
      assert_eq!(base_of(payload), base);
    }
  }
}
