//! The backing region.
//!
//! One contiguous range of writable bytes, obtained from the operating
//! system exactly once and handed back exactly once. The allocator carves
//! every block out of this range; no other system allocation happens on the
//! allocation or release paths.
//!
//! The mapping is an anonymous private `mmap`, with the length rounded up
//! to the page size so the mapped and unmapped extents match. Anonymous
//! mappings come back zero-filled, which the pointer-validation path in the
//! allocator relies on: every byte of the region is initialized from the
//! start.

use std::ptr;

use libc::{
  _SC_PAGESIZE, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap,
  munmap, sysconf,
};

use crate::align_to;
use crate::error::{AllocError, AllocResult};

/// An owned anonymous memory mapping.
///
/// Unmapped exactly once, when the region is dropped.
#[derive(Debug)]
pub struct Region {
  base: *mut u8,
  len: usize,
}

impl Region {
  /// Maps at least `bytes` of zero-filled writable memory.
  ///
  /// # Errors
  ///
  /// [`AllocError::RegionTooSmall`] for a zero request,
  /// [`AllocError::MapFailed`] when the kernel refuses the mapping.
  pub fn new(bytes: usize) -> AllocResult<Self> {
    if bytes == 0 {
      return Err(AllocError::RegionTooSmall);
    }

    let page = unsafe { sysconf(_SC_PAGESIZE) } as usize;
    let len = align_to!(bytes, page);

    let base = unsafe {
      mmap(
        ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if base == MAP_FAILED {
      log::debug!("mmap of {} bytes failed", len);
      return Err(AllocError::MapFailed);
    }

    log::debug!("mapped backing region: {} bytes at {:?}", len, base);

    Ok(Self {
      base: base as *mut u8,
      len,
    })
  }

  /// Base address of the mapping.
  pub fn base(&self) -> *mut u8 {
    self.base
  }

  /// Mapped length in bytes; at least the requested size.
  pub fn len(&self) -> usize {
    self.len
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    let rc = unsafe { munmap(self.base as *mut c_void, self.len) };
    if rc != 0 {
      log::debug!("munmap of {:?} failed", self.base);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_byte_regions_are_rejected() {
    assert_eq!(Region::new(0).unwrap_err(), AllocError::RegionTooSmall);
  }

  #[test]
  fn region_is_writable_and_zero_filled() {
    let region = Region::new(1000).unwrap();
    assert!(region.len() >= 1000);

    unsafe {
      for offset in 0..1000 {
        assert_eq!(*region.base().add(offset), 0);
      }

      region.base().write_bytes(0xAB, 1000);
      assert_eq!(*region.base(), 0xAB);
      assert_eq!(*region.base().add(999), 0xAB);
    }
  }

  #[test]
  fn dropping_a_region_does_not_disturb_others() {
    let first = Region::new(4096).unwrap();
    let second = Region::new(4096).unwrap();

    unsafe { first.base().write_bytes(0x11, 4096) };
    drop(second);
    unsafe { assert_eq!(*first.base().add(4095), 0x11) };
  }
}
