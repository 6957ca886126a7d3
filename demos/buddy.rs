use std::io::Read;

use fiballocator::{BuddyAllocator, HEADER_SIZE};

/// Waits until the user presses ENTER.
/// Useful when you want to follow the free-list changes step by step.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn main() {
  // A small heap makes every split and merge visible: the capacity
  // becomes the largest Fibonacci number that fits, here 987.
  let mut allocator = BuddyAllocator::new(1000).expect("failed to set up the heap");

  println!(
    "Heap ready: capacity {} bytes, header {} bytes per block",
    allocator.capacity(),
    HEADER_SIZE
  );
  print!("{}", allocator.dump_free_list());
  block_until_enter_pressed();

  unsafe {
    // --------------------------------------------------------------------
    // 1) Allocate 100 bytes. The request rounds up to the next Fibonacci
    //    footprint and the root block splits down to it.
    // --------------------------------------------------------------------
    let first = allocator.allocate(100).expect("allocation failed");
    println!("\n[1] allocate(100) -> {:?}", first);
    print!("{}", allocator.dump_free_list());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 30 bytes and write a pattern into it to show the
    //    payload is usable.
    // --------------------------------------------------------------------
    let second = allocator.allocate(30).expect("allocation failed");
    second.write_bytes(0xAB, 30);
    println!("\n[2] allocate(30) -> {:?}, filled with 0xAB", second);
    print!("{}", allocator.dump_free_list());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Release the first block. It merges with free neighbors from its
    //    own splits, but not past the still-live second block.
    // --------------------------------------------------------------------
    allocator.release(first).expect("release failed");
    println!("\n[3] release(first)");
    print!("{}", allocator.dump_free_list());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Release the second block. Coalescing cascades all the way back
    //    to a single block spanning the whole capacity.
    // --------------------------------------------------------------------
    allocator.release(second).expect("release failed");
    println!("\n[4] release(second): fully coalesced");
    print!("{}", allocator.dump_free_list());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Releasing the same pointer twice is rejected and leaves the
    //    heap untouched.
    // --------------------------------------------------------------------
    match allocator.release(second) {
      Err(error) => println!("\n[5] second release rejected: {}", error),
      Ok(()) => unreachable!("double release must not succeed"),
    }
    print!("{}", allocator.dump_free_list());
  }

  println!(
    "\n[6] done: {} allocation(s), peak {} bytes",
    allocator.stats().allocation_count(),
    allocator.stats().peak_allocated()
  );
  allocator.shutdown();
}
