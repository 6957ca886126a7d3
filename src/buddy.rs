//! # Fibonacci Buddy Allocator
//!
//! A heap allocator whose admissible block sizes are Fibonacci numbers.
//! One contiguous backing region is mapped at construction; `allocate`
//! carves Fibonacci-sized blocks out of it and `release` merges freed
//! blocks back together.
//!
//! ## Splitting
//!
//! The identity `F[i] = F[i-1] + F[i-2]` lets a block of index `i` split
//! into two children that exactly tile it. The larger child always comes
//! first:
//!
//! ```text
//!   ┌─────────────────────────── F[i] ────────────────────────────┐
//!   │                        parent block                         │
//!   └─────────────────────────────────────────────────────────────┘
//!
//!   ┌────────────── F[i-1] ──────────────┬───────── F[i-2] ───────┐
//!   │    left child (index i-1)          │  right child (i-2)     │
//!   └────────────────────────────────────┴────────────────────────┘
//!   ▲                                    ▲
//!   base                                 base + F[i-1]
//! ```
//!
//! An allocation rounds its request up to the smallest admissible size,
//! finds a free block, and splits the left child repeatedly until the
//! target index is reached. The right child of every split stays free.
//!
//! ## Coalescing
//!
//! Splits are asymmetric, so a block cannot find its buddy with address
//! arithmetic alone; it must know its own index. A freed block has at most
//! two candidate buddies, one per orientation:
//!
//! ```text
//!   block was the LEFT child:            block was the RIGHT child:
//!
//!   ┌── F[i] ───┬─ F[i-1] ─┐             ┌─ F[i+1] ──┬── F[i] ───┐
//!   │   block   │  buddy   │             │   buddy   │   block   │
//!   └───────────┴──────────┘             └───────────┴───────────┘
//!   merges to index i+1                  merges to index i+2
//!   at the block's base                  at the buddy's base
//! ```
//!
//! A candidate qualifies only when it is free, carries the expected index,
//! and the merged extent is a node of the split tree rooted at the initial
//! heap block. The last condition matters: two adjacent free blocks can
//! satisfy the address and index tests without sharing a parent, and
//! merging such a pair would leave the heap permanently unmergeable at
//! that boundary. Equal-sized adjacent blocks are never buddies.
//!
//! ## Minimum block size
//!
//! Every block stores its own header, so no block smaller than the header
//! may ever exist. Split cascades reach index `target - 1`, so the target
//! is raised to one past the smallest header-carrying index. Requests below
//! that size simply consume the minimum block.
//!
//! ## Thread safety
//!
//! The allocator is single threaded and synchronous. Callers that share it
//! across threads must wrap it in their own mutual exclusion.

use std::fmt::Write as _;
use std::ptr;

use crate::block::{BLOCK_FREE, BLOCK_USED, BlockHeader, HEADER_SIZE, base_of, payload_of};
use crate::error::{AllocError, AllocResult};
use crate::fib::FibTable;
use crate::free_list::FreeList;
use crate::region::Region;
use crate::stats::AllocStats;

/// A Fibonacci buddy heap over one owned backing region.
///
/// All bookkeeping lives in block headers inside the region; the struct
/// itself holds only the mapping, the size table, the free-list head, and
/// counters. Dropping the allocator (or calling [`shutdown`]) unmaps the
/// region, at which point every pointer it ever returned is dead.
///
/// [`shutdown`]: BuddyAllocator::shutdown
#[derive(Debug)]
pub struct BuddyAllocator {
  region: Region,
  table: FibTable,
  free: FreeList,
  min_target: usize,
  stats: AllocStats,
}

impl BuddyAllocator {
  /// Maps a backing region of `bytes` and prepares a heap inside it.
  ///
  /// The heap capacity becomes the largest Fibonacci number not exceeding
  /// `bytes` (capped at 4 GiB); backing bytes past it stay unused. The
  /// whole capacity starts as a single free block.
  ///
  /// # Errors
  ///
  /// [`AllocError::RegionTooSmall`] when `bytes` cannot host a block with
  /// a header and two payload bytes, [`AllocError::MapFailed`] when the
  /// mapping is refused.
  pub fn new(bytes: usize) -> AllocResult<Self> {
    if bytes < HEADER_SIZE + 2 {
      return Err(AllocError::RegionTooSmall);
    }

    let table = FibTable::build(bytes.min(u32::MAX as usize))?;
    if table.capacity() < HEADER_SIZE + 2 {
      return Err(AllocError::RegionTooSmall);
    }

    let region = Region::new(bytes)?;

    let header_index = table
      .smallest_index_at_least(HEADER_SIZE)
      .expect("capacity exceeds the header size");
    let min_target = (header_index + 1).min(table.count() - 1);

    let mut allocator = Self {
      region,
      table,
      free: FreeList::new(),
      min_target,
      stats: AllocStats::new(),
    };

    let top = allocator.table.count() - 1;
    let root = BlockHeader::free(allocator.table.capacity() as u32, top as u16);
    unsafe {
      root.write(allocator.heap_start());
      allocator.free.insert(allocator.heap_start());
    }

    log::debug!(
      "fibonacci heap ready: capacity {} bytes across {} indices",
      allocator.table.capacity(),
      allocator.table.count()
    );

    Ok(allocator)
  }

  /// Hands out a block with at least `n` usable payload bytes.
  ///
  /// The request is rounded up to the smallest admissible Fibonacci
  /// footprint that also fits the header, then satisfied from the free
  /// list: an exact-index match wins, otherwise the lowest-address larger
  /// block is split down to the target. On failure the free list is left
  /// exactly as it was.
  ///
  /// Payload pointers are byte-addressed; Fibonacci footprints put blocks
  /// at arbitrary offsets, so no alignment is promised.
  ///
  /// # Safety
  ///
  /// The returned pointer is valid for `n` bytes of reads and writes until
  /// the matching [`release`]. The caller must not touch the header bytes
  /// in front of it, and must not use the pointer after releasing it or
  /// after the allocator is dropped.
  ///
  /// [`release`]: BuddyAllocator::release
  pub unsafe fn allocate(
    &mut self,
    n: usize,
  ) -> AllocResult<*mut u8> {
    let need = n.checked_add(HEADER_SIZE).ok_or(AllocError::OutOfMemory)?;
    let raw_target = match self.table.smallest_index_at_least(need) {
      Some(index) => index,
      None => {
        log::debug!("allocate({}) needs {} bytes, over capacity", n, need);
        return Err(AllocError::OutOfMemory);
      }
    };
    let target = raw_target.max(self.min_target);

    if self.free.is_empty() {
      log::debug!("allocate({}): heap exhausted", n);
      return Err(AllocError::OutOfMemory);
    }

    // One pass: first exact-index match wins outright, otherwise remember
    // the first (lowest-address) block that is big enough to split.
    let mut exact: *mut u8 = ptr::null_mut();
    let mut larger: *mut u8 = ptr::null_mut();
    unsafe {
      for block in self.free.iter() {
        let header = BlockHeader::read(block);
        self.verify_free_header(block, &header);

        let index = header.fib_index as usize;
        if index == target {
          exact = block;
          break;
        }
        if index > target && larger.is_null() {
          larger = block;
        }
      }
    }

    let block = if !exact.is_null() {
      exact
    } else if !larger.is_null() {
      larger
    } else {
      log::debug!("allocate({}): no block at or above index {}", n, target);
      return Err(AllocError::OutOfMemory);
    };

    unsafe {
      self.split_to(block, target);
      self.free.remove(block);

      let size = self.table.value(target) as u32;
      let mut header = BlockHeader::read(block);
      header.is_free = BLOCK_USED;
      header.req_size = n as u32;
      header.write(block);

      self.stats.record_allocation(size as u64);
      log::trace!(
        "allocated offset {} (index {}, {} bytes) for a {} byte request",
        self.offset_of(block),
        target,
        size,
        n
      );

      Ok(payload_of(block))
    }
  }

  /// Returns a previously allocated block to the heap.
  ///
  /// The block is marked free, merged with its Fibonacci buddy as long as
  /// one qualifies, and the result is put back on the free list.
  ///
  /// # Errors
  ///
  /// [`AllocError::InvalidPointer`] when `p` was not returned by
  /// [`allocate`] on this allocator or was already released. A rejected
  /// call leaves the allocator untouched. The checks read the bytes at the
  /// claimed header position, so a payload crafted to mimic a live header
  /// can still defeat them; that is a caller-side programming error.
  ///
  /// # Safety
  ///
  /// `p` must not be used again after a successful release.
  ///
  /// [`allocate`]: BuddyAllocator::allocate
  pub unsafe fn release(
    &mut self,
    p: *mut u8,
  ) -> AllocResult<()> {
    let heap_start = self.heap_start() as usize;
    let addr = p as usize;

    // The payload sits HEADER_SIZE past its block base, which must itself
    // lie inside the heap.
    if addr < heap_start + HEADER_SIZE || addr >= heap_start + self.capacity() {
      log::debug!("release of {:?}: outside the heap", p);
      return Err(AllocError::InvalidPointer);
    }

    let block = unsafe { base_of(p) };
    let offset = self.offset_of(block);
    let header = unsafe { BlockHeader::read(block) };

    let index = header.fib_index as usize;
    if index >= self.table.count()
      || header.size as usize != self.table.value(index)
      || !self.is_tree_node(offset, index)
    {
      log::debug!("release of {:?}: not a block boundary", p);
      return Err(AllocError::InvalidPointer);
    }

    if header.is_free != BLOCK_USED {
      log::debug!("release of {:?}: block at offset {} is not live", p, offset);
      return Err(AllocError::InvalidPointer);
    }

    let size = header.size;
    unsafe {
      BlockHeader::free(size, index as u16).write(block);
      let merged = self.coalesce(block);
      self.free.insert(merged);
    }

    self.stats.record_release(size as u64);
    log::trace!("released offset {} (index {})", offset, index);
    Ok(())
  }

  /// Renders the free list, one block per line, in ascending address
  /// order. Read-only; calling it never changes allocator state.
  pub fn dump_free_list(&self) -> String {
    let mut entries = Vec::new();
    let mut free_bytes = 0u64;
    unsafe {
      for block in self.free.iter() {
        let header = BlockHeader::read(block);
        free_bytes += header.size as u64;
        entries.push((self.offset_of(block), header.size, header.fib_index));
      }
    }

    let mut out = String::new();
    let _ = writeln!(
      out,
      "free list: {} block(s), {} of {} bytes free",
      entries.len(),
      free_bytes,
      self.capacity()
    );
    if entries.is_empty() {
      let _ = writeln!(out, "  (empty)");
    }
    for (offset, size, index) in entries {
      let _ = writeln!(
        out,
        "  offset {:>10}  size {:>10}  index {:>3}",
        offset, size, index
      );
    }
    out
  }

  /// Tears the allocator down, unmapping the backing region.
  ///
  /// Dropping the allocator has the same effect; this merely gives the
  /// teardown a name at call sites that want one.
  pub fn shutdown(self) {
    log::debug!("shutting down: capacity {} bytes returned", self.capacity());
  }

  /// The heap capacity: the largest Fibonacci number that fit into the
  /// backing region.
  pub fn capacity(&self) -> usize {
    self.table.capacity()
  }

  /// Allocation counters for this heap.
  pub fn stats(&self) -> &AllocStats {
    &self.stats
  }

  fn heap_start(&self) -> *mut u8 {
    self.region.base()
  }

  fn offset_of(
    &self,
    block: *mut u8,
  ) -> usize {
    block as usize - self.heap_start() as usize
  }

  /// Aborts on a free-list resident header that contradicts the table.
  fn verify_free_header(
    &self,
    block: *mut u8,
    header: &BlockHeader,
  ) {
    let index = header.fib_index as usize;
    if index >= self.table.count()
      || header.size as usize != self.table.value(index)
      || header.is_free != BLOCK_FREE
    {
      panic!(
        "heap corruption: free block at offset {} claims size {} at index {}",
        self.offset_of(block),
        header.size,
        header.fib_index
      );
    }
  }

  /// True when `(offset, index)` names a node of the split tree rooted at
  /// the whole heap.
  ///
  /// Descends from the root: a left child keeps its parent's base at index
  /// `i-1`, a right child starts `F[i-1]` later at index `i-2`. The walk
  /// follows the one child whose extent contains `offset` and gives up
  /// once the index drops to the requested one without a match.
  fn is_tree_node(
    &self,
    offset: usize,
    index: usize,
  ) -> bool {
    if index >= self.table.count() || offset >= self.capacity() {
      return false;
    }

    let mut node_offset = 0usize;
    let mut node_index = self.table.count() - 1;

    loop {
      if node_offset == offset && node_index == index {
        return true;
      }
      if node_index < 2 || node_index <= index {
        return false;
      }

      let left_size = self.table.value(node_index - 1);
      if offset < node_offset + left_size {
        node_index -= 1;
      } else {
        node_offset += left_size;
        node_index -= 2;
      }
    }
  }

  /// Splits `block` until its index equals `target`.
  ///
  /// The block must be free-list resident with an index at or above
  /// `target`; it stays resident (as the shrinking left child) throughout,
  /// and every right child joins the free list.
  unsafe fn split_to(
    &mut self,
    block: *mut u8,
    target: usize,
  ) {
    unsafe {
      loop {
        let index = BlockHeader::read(block).fib_index as usize;
        if index <= target {
          break;
        }
        assert!(
          index >= 2,
          "heap corruption: block of index {} cannot split",
          index
        );

        self.free.remove(block);

        let left_size = self.table.value(index - 1);
        let right_size = self.table.value(index - 2);
        let right = block.add(left_size);

        BlockHeader::free(right_size as u32, (index - 2) as u16).write(right);
        BlockHeader::free(left_size as u32, (index - 1) as u16).write(block);

        self.free.insert(block);
        self.free.insert(right);

        log::trace!(
          "split index {} at offset {} into {} + {}",
          index,
          self.offset_of(block),
          left_size,
          right_size
        );
      }
    }
  }

  /// Merges `block` with qualifying buddies until none remains, returning
  /// the final (possibly grown) block. `block` must be free and detached;
  /// the result is likewise detached.
  unsafe fn coalesce(
    &mut self,
    block: *mut u8,
  ) -> *mut u8 {
    unsafe {
      let mut block = block;

      loop {
        let header = BlockHeader::read(block);
        let index = header.fib_index as usize;
        let count = self.table.count();
        let offset = self.offset_of(block);

        // Right neighbor: this block as the left child of a parent at
        // index + 1, whose right child must hold index - 1.
        if index >= 1 && index + 1 < count && self.is_tree_node(offset, index + 1) {
          let right = block.add(header.size as usize);
          if let Some(buddy) = self.free.find(right) {
            if BlockHeader::read(buddy).fib_index as usize == index - 1 {
              self.free.remove(buddy);
              let parent_size = self.table.value(index + 1);
              BlockHeader::free(parent_size as u32, (index + 1) as u16).write(block);
              log::trace!(
                "merged offsets {} + {} into index {}",
                offset,
                offset + header.size as usize,
                index + 1
              );
              continue;
            }
          }
        }

        // Left neighbor: this block as the right child of a parent at
        // index + 2, whose left child must hold index + 1.
        if index + 2 < count {
          let sibling_size = self.table.value(index + 1);
          if offset >= sibling_size && self.is_tree_node(offset - sibling_size, index + 2) {
            let left = block.sub(sibling_size);
            if let Some(buddy) = self.free.find(left) {
              if BlockHeader::read(buddy).fib_index as usize == index + 1 {
                self.free.remove(buddy);
                let parent_size = self.table.value(index + 2);
                BlockHeader::free(parent_size as u32, (index + 2) as u16).write(left);
                log::trace!(
                  "merged offsets {} + {} into index {}",
                  offset - sibling_size,
                  offset,
                  index + 2
                );
                block = left;
                continue;
              }
            }
          }
        }

        return block;
      }
    }
  }

  /// Walks the whole heap and asserts every steady-state invariant.
  #[cfg(test)]
  fn check_invariants(&self) {
    unsafe {
      // Block footprints must exactly tile the capacity, and every header
      // must agree with the table.
      let mut offset = 0usize;
      let mut blocks = Vec::new();
      while offset < self.capacity() {
        let header = BlockHeader::read(self.heap_start().add(offset));
        let index = header.fib_index as usize;
        assert!(index < self.table.count(), "bad index at offset {}", offset);
        assert_eq!(
          header.size as usize,
          self.table.value(index),
          "size and index disagree at offset {}",
          offset
        );
        assert!(
          header.is_free == BLOCK_FREE || header.is_free == BLOCK_USED,
          "bad free flag at offset {}",
          offset
        );
        assert!(
          self.is_tree_node(offset, index),
          "block at offset {} is not on a split boundary",
          offset
        );
        blocks.push((offset, header));
        offset += header.size as usize;
      }
      assert_eq!(offset, self.capacity(), "blocks do not tile the heap");

      // The free list must hold exactly the free-marked blocks, ascending.
      let listed: Vec<usize> = self.free.iter().map(|b| self.offset_of(b)).collect();
      for pair in listed.windows(2) {
        assert!(pair[0] < pair[1], "free list out of address order");
      }
      let marked: Vec<usize> = blocks
        .iter()
        .filter(|(_, h)| h.is_free == BLOCK_FREE)
        .map(|(o, _)| *o)
        .collect();
      assert_eq!(listed, marked, "free list disagrees with free flags");

      // Maximal coalescing: no adjacent free pair may still qualify.
      for window in blocks.windows(2) {
        let (a_offset, a) = window[0];
        let (_, b) = window[1];
        if a.is_free == BLOCK_FREE && b.is_free == BLOCK_FREE {
          let mergeable = b.fib_index + 1 == a.fib_index
            && self.is_tree_node(a_offset, a.fib_index as usize + 1);
          assert!(!mergeable, "unmerged buddies at offset {}", a_offset);
        }
      }
    }
  }

  /// Free blocks as `(offset, size, index)` triples, ascending.
  #[cfg(test)]
  fn free_blocks(&self) -> Vec<(usize, u32, u16)> {
    unsafe {
      self
        .free
        .iter()
        .map(|block| {
          let header = BlockHeader::read(block);
          (self.offset_of(block), header.size, header.fib_index)
        })
        .collect()
    }
  }
}
