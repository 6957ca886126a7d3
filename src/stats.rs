//! Allocation statistics.
//!
//! A small per-allocator counter set: bytes currently handed out (block
//! footprints, header included), the high-water mark, and call counts.
//! Updated on every successful `allocate` and `release`.

/// Counters carried by one allocator instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
  total_allocated: u64,
  peak_allocated: u64,
  allocation_count: u64,
  release_count: u64,
}

impl AllocStats {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn record_allocation(
    &mut self,
    bytes: u64,
  ) {
    self.total_allocated += bytes;
    self.allocation_count += 1;
    if self.total_allocated > self.peak_allocated {
      self.peak_allocated = self.total_allocated;
    }
  }

  pub(crate) fn record_release(
    &mut self,
    bytes: u64,
  ) {
    self.total_allocated = self.total_allocated.saturating_sub(bytes);
    self.release_count += 1;
  }

  /// Bytes currently allocated, block footprints included.
  pub fn total_allocated(&self) -> u64 {
    self.total_allocated
  }

  /// Highest value `total_allocated` has ever reached.
  pub fn peak_allocated(&self) -> u64 {
    self.peak_allocated
  }

  /// Successful `allocate` calls.
  pub fn allocation_count(&self) -> u64 {
    self.allocation_count
  }

  /// Successful `release` calls.
  pub fn release_count(&self) -> u64 {
    self.release_count
  }

  /// Free bytes left in a heap of the given capacity.
  pub fn free_memory(
    &self,
    capacity: u64,
  ) -> u64 {
    capacity.saturating_sub(self.total_allocated)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_stats_are_zeroed() {
    let stats = AllocStats::new();

    assert_eq!(stats.total_allocated(), 0);
    assert_eq!(stats.peak_allocated(), 0);
    assert_eq!(stats.allocation_count(), 0);
    assert_eq!(stats.release_count(), 0);
  }

  #[test]
  fn totals_follow_allocations_and_releases() {
    let mut stats = AllocStats::new();

    stats.record_allocation(1000);
    assert_eq!(stats.total_allocated(), 1000);
    assert_eq!(stats.allocation_count(), 1);

    stats.record_allocation(500);
    assert_eq!(stats.total_allocated(), 1500);

    stats.record_release(500);
    assert_eq!(stats.total_allocated(), 1000);
    assert_eq!(stats.release_count(), 1);
  }

  #[test]
  fn peak_survives_releases() {
    let mut stats = AllocStats::new();

    stats.record_allocation(1000);
    stats.record_release(1000);
    stats.record_allocation(400);

    assert_eq!(stats.total_allocated(), 400);
    assert_eq!(stats.peak_allocated(), 1000);
  }

  #[test]
  fn free_memory_never_underflows() {
    let mut stats = AllocStats::new();
    stats.record_allocation(900);

    assert_eq!(stats.free_memory(1000), 100);
    assert_eq!(stats.free_memory(900), 0);
    assert_eq!(stats.free_memory(500), 0);
  }
}
