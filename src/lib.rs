//! # fiballocator - A Fibonacci Buddy-System Memory Allocator
//!
//! This crate provides a heap allocator whose admissible block sizes are
//! **Fibonacci numbers** rather than powers of two. The splitting and
//! merging algebra rests on the identity `F[i] = F[i-1] + F[i-2]`.
//!
//! ## Overview
//!
//! ```text
//!   Fibonacci buddy concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                HEAP (capacity = F[K-1], e.g. 144)                │
//!   │                                                                  │
//!   │   ┌─────────────────────────────────────┬──────────────────────┐ │
//!   │   │               89 (F[9])             │       55 (F[8])      │ │
//!   │   └─────────────────────────────────────┴──────────────────────┘ │
//!   │   ┌───────────────────────┬─────────────┐                        │
//!   │   │        55 (F[8])      │   34 (F[7]) │                        │
//!   │   └───────────────────────┴─────────────┘                        │
//!   │                                                                  │
//!   │   Each split divides F[i] into F[i-1] + F[i-2]; each release     │
//!   │   merges a block with its unique sibling from that split.        │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Power-of-two buddies find each other with a single address XOR. A
//! Fibonacci split is asymmetric, so a block must remember its table index
//! and check both possible orientations (left child or right child of its
//! parent) against the split tree to locate its buddy. That asymmetric
//! buddy search is the heart of this crate.
//!
//! ## Crate Structure
//!
//! ```text
//!   fiballocator
//!   ├── align      - Page-rounding macro for the mapping request
//!   ├── fib        - The Fibonacci size table (index ↔ value)
//!   ├── block      - Block header stored in front of every payload
//!   ├── free_list  - Address-ordered intrusive list of free blocks
//!   ├── region     - The mmap-backed region the heap lives in
//!   ├── stats      - Per-allocator allocation counters
//!   ├── error      - Error kinds and the result alias
//!   └── buddy      - BuddyAllocator: allocate / release / dump
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use fiballocator::BuddyAllocator;
//!
//! let mut allocator = BuddyAllocator::new(4096).unwrap();
//!
//! unsafe {
//!   let p = allocator.allocate(100).unwrap();
//!   p.write_bytes(0x42, 100);
//!
//!   println!("{}", allocator.dump_free_list());
//!   allocator.release(p).unwrap();
//! }
//!
//! allocator.shutdown();
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: callers serialize access themselves
//! - **Byte-addressed payloads**: Fibonacci footprints land on arbitrary
//!   offsets, so no payload alignment is promised
//! - **One region per heap**: capacity is fixed at construction (4 GiB max)
//! - **Unix-only**: the backing region comes from `mmap` via `libc`
//!
//! ## Safety
//!
//! `allocate` and `release` trade in raw pointers and are `unsafe`: the
//! allocator guarantees its own bookkeeping stays inside the mapped
//! region, but callers are responsible for not using payloads outside
//! their allocate/release window.

pub mod align;
mod block;
mod buddy;
mod error;
mod fib;
mod free_list;
mod region;
mod stats;

pub use block::HEADER_SIZE;
pub use buddy::BuddyAllocator;
pub use error::{AllocError, AllocResult};
pub use fib::FibTable;
pub use region::Region;
pub use stats::AllocStats;
