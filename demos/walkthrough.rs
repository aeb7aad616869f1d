use std::io::Read;

use libc::sbrk;
use segalloc::{SbrkHeap, SbrkProvider};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  // Our segregated free list heap. Unlike its bump-allocator ancestor it
  // tracks freed blocks in 30 size-class buckets and can reuse them, so
  // freeing and reallocating are no longer dead ends.
  let mut heap = SbrkHeap::new(SbrkProvider::new());

  unsafe {
    print_program_break("start");
    assert!(heap.init(), "heap init should succeed");
    print_program_break("after init");
    block_until_enter_pressed();
  }

  // --------------------------------------------------------------------
  // 1) Allocate space for a u32.
  // --------------------------------------------------------------------
  let first_block = heap.allocate(4).expect("allocation should succeed");
  println!("\n[1] Allocate u32 -> {:?}", first_block);
  unsafe { (first_block.as_ptr() as *mut u32).write(0xDEADBEEF) };
  println!("[1] Value written = 0x{:X}", unsafe { (first_block.as_ptr() as *mut u32).read() });
  assert!(heap.validate_heap());
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Allocate 12 "odd-sized" bytes.
  // --------------------------------------------------------------------
  let second_block = heap.allocate(12).expect("allocation should succeed");
  println!("\n[2] Allocate [u8; 12] -> {:?}", second_block);
  unsafe { second_block.as_ptr().write_bytes(0xAB, 12) };
  println!("[2] Initialized second block with 0xAB");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Allocate a u64 to see the 8-byte alignment this allocator promises.
  // --------------------------------------------------------------------
  let third_block = heap.allocate(8).expect("allocation should succeed");
  println!("\n[3] Allocate u64 -> {:?}", third_block);
  unsafe { (third_block.as_ptr() as *mut u64).write(0x1122334455667788) };
  let addr = third_block.as_ptr() as usize;
  println!("[3] Address = {addr:#X}, addr % 8 = {}", addr % 8);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Free the first block, then allocate something small enough to
  //    reuse it -- this is the behavior a bump allocator could never show.
  // --------------------------------------------------------------------
  heap.free(Some(first_block));
  println!("\n[4] Freed first_block at {:?}", first_block);
  assert!(heap.validate_heap());

  let fourth_block = heap.allocate(2).expect("allocation should succeed");
  println!("[4] Allocate [u8; 2] -> {:?}", fourth_block);
  println!(
    "[4] fourth_block == first_block? {}",
    if fourth_block == first_block { "yes, the freed block was reused" } else { "no, allocated elsewhere" }
  );
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Grow an allocation in place by freeing its neighbor first.
  // --------------------------------------------------------------------
  let grow_me = heap.allocate(16).expect("allocation should succeed");
  unsafe { grow_me.as_ptr().write_bytes(0xCD, 16) };
  let neighbor = heap.allocate(16).expect("allocation should succeed");
  heap.free(Some(neighbor));

  let grown = heap.reallocate(Some(grow_me), 16 + 16 + 4).expect("reallocation should succeed");
  println!(
    "\n[5] Reallocate grow_me to absorb its freed neighbor: {} (same pointer = in-place growth)",
    if grown == grow_me { "reused pointer" } else { "moved" }
  );
  assert!(heap.validate_heap());
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) Allocate a large block to force segment growth.
  // --------------------------------------------------------------------
  unsafe { print_program_break("before large alloc") };
  let big_block = heap.allocate(64 * 1024).expect("allocation should succeed");
  println!("\n[6] Allocate large 64 KiB block -> {:?}", big_block);
  unsafe { print_program_break("after large alloc") };
  assert!(heap.validate_heap());
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 7) End of demo.
  //
  //    Every block this allocator ever hands out gets merged back with its
  //    neighbors on free; the process exiting is what finally reclaims the
  //    whole segment.
  // --------------------------------------------------------------------
  println!("\n[7] End of walkthrough. Process will exit and the OS will reclaim all memory.");
}
