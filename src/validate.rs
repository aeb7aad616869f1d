//! Heap validation and diagnostic hooks.
//!
//! `validate_heap` is a real structural walk — useful in tests and for
//! callers who want to sanity-check the heap after a suspicious sequence
//! of operations — but it is never called on the hot allocation path, so
//! its cost never shows up in `allocate`/`free` throughput. The `print_*`
//! hooks exist only as named extension points; like their C ancestor they
//! are no-ops, left here so a debugging session has somewhere to put
//! temporary `log::trace!` calls without touching the allocator core.

use crate::block::{Offset, ALIGNMENT};
use crate::page::PageProvider;
use crate::seglist::bucket_of;
use crate::Heap;

impl<P: PageProvider> Heap<P> {
  /// Walks the heap from the first block to the epilogue, checking:
  /// - every free block's header matches its footer,
  /// - every free block is reachable from exactly the bucket its size maps to,
  /// - every block's prev-alloc bit agrees with its predecessor's curr-alloc bit,
  /// - the segment ends in a zero-size allocated epilogue.
  ///
  /// Returns `true` if the heap has not been initialized yet (nothing to check).
  pub fn validate_heap(&self) -> bool {
    let Some(seg) = self.segment() else { return true };

    let mut bp: Offset = ALIGNMENT;
    let mut expected_prev_alloc = true; // the prologue pad counts as allocated

    loop {
      let size = unsafe { seg.get_hdr_size(bp) };
      let curr_alloc = unsafe { seg.get_curr_alloc(bp) };
      let prev_alloc = unsafe { seg.get_prev_alloc(bp) };

      if prev_alloc != expected_prev_alloc {
        return false;
      }

      if size == 0 {
        // Epilogue: must be allocated and sit exactly at the segment end.
        return curr_alloc && bp == self.size();
      }

      if !curr_alloc {
        let header = unsafe { seg.raw_word(seg.hdr_addr(bp)) };
        let footer = unsafe { seg.raw_word(seg.ftr_addr(bp)) };
        if header != footer {
          return false;
        }
        if !self.block_is_in_its_bucket(bp, size) {
          return false;
        }
      }

      expected_prev_alloc = curr_alloc;
      bp = unsafe { seg.next_block(bp) };
    }
  }

  fn block_is_in_its_bucket(&self, bp: Offset, size: u32) -> bool {
    let Some(seg) = self.segment() else { return false };
    let bucket = bucket_of(size);
    let mut curr = self.seglist().bucket_head(bucket);

    while curr != 0 {
      if curr == bp {
        return true;
      }
      curr = unsafe { seg.get_next_link(curr) };
    }
    false
  }

  /// Prints per-bucket free block counts. No-op; a debugging build can
  /// enable output here without touching the allocator core.
  pub fn print_bucket_counts(&self) {}

  /// Prints the contents of every free-list bucket. No-op.
  pub fn print_free_lists(&self) {}

  /// Prints every block in heap order with its size and allocation state. No-op.
  pub fn print_entire_heap(&self) {}
}

#[cfg(test)]
mod tests {
  use crate::page::ArenaProvider;
  use crate::Heap;

  fn heap_with_pages(npages: usize) -> Heap<ArenaProvider> {
    let mut heap = Heap::new(ArenaProvider::with_capacity((npages + 8) * crate::page::PAGE_SIZE));
    assert!(heap.init());
    heap
  }

  #[test]
  fn fresh_heap_validates() {
    let heap = heap_with_pages(3);
    assert!(heap.validate_heap());
  }

  #[test]
  fn heap_validates_after_alloc_and_free_sequences() {
    let mut heap = heap_with_pages(3);
    let a = heap.allocate(16).unwrap();
    let b = heap.allocate(32).unwrap();
    let c = heap.allocate(64).unwrap();
    assert!(heap.validate_heap());

    heap.free(Some(b));
    assert!(heap.validate_heap());

    heap.free(Some(a));
    assert!(heap.validate_heap());

    heap.free(Some(c));
    assert!(heap.validate_heap());
  }

  #[test]
  fn heap_validates_after_growth_and_reallocation() {
    let mut heap = heap_with_pages(8);
    let mut p = heap.allocate(2000).unwrap();
    for _ in 0..5 {
      p = heap.reallocate(Some(p), 4000).unwrap();
      assert!(heap.validate_heap());
    }
  }
}
