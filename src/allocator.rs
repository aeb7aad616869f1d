//! # Segregated Free List Allocator
//!
//! The allocator core: `init`, `allocate`, `free`, `reallocate`, and the
//! splitting/coalescing machinery that ties the block primitives
//! ([`crate::block`]) to the segregated free list ([`crate::seglist`]).
//!
//! ## Heap Layout
//!
//! ```text
//!   base                                                          base + size
//!    │                                                                  │
//!    ▼                                                                  ▼
//!    ┌────────┬──────────────────────────────────────┬─────────────────┐
//!    │ prolog │         blocks, adjacent, no gaps     │ epilogue header │
//!    │ 8 bytes│                                       │    0 bytes      │
//!    └────────┴──────────────────────────────────────┴─────────────────┘
//!             ▲
//!             first payload, offset 8 (8-byte aligned)
//! ```
//!
//! The prologue pad and epilogue header are both "allocated" from the
//! coalescer's point of view, so a block at either end of the segment
//! never tries to merge off the edge.
//!
//! ## Growth
//!
//! On a search miss, [`Heap::allocate`] asks the page provider for more
//! pages, reusing the old epilogue header's slot as the new free block's
//! header (the same trick `sbrk`-based allocators use to avoid wasting a
//! word per grow). If the heap's tail block was already free, the new
//! pages are folded into it instead of creating a second free block.

use core::ptr::NonNull;

use crate::block::{self, Offset, Segment, ALIGNMENT, HDR_SIZE, MIN_PAYLOAD};
use crate::page::{PageProvider, PAGE_SIZE};
use crate::seglist::{bucket_of, SegList};

const INIT_NPAGES: usize = 3;

/// Which search strategy [`Heap::allocate`] uses on a bucket miss.
///
/// The design this allocator is drawn from treats fit policy as a
/// build-time choice (originally a `#define` A/B flag); here it is a cargo
/// feature instead. See the crate's `Cargo.toml` — enable `best_fit` to
/// switch; the default is first-fit.
#[cfg(all(feature = "first_fit", feature = "best_fit"))]
compile_error!("enable at most one of the `first_fit` / `best_fit` features");

/// A segregated, boundary-tag heap allocator over a page provider `P`.
///
/// `P` defaults to nothing in particular — see [`crate::SbrkHeap`] for the
/// production instantiation over [`crate::page::SbrkProvider`], and use
/// [`crate::page::ArenaProvider`] directly for tests or embedded use over a
/// caller-owned buffer.
pub struct Heap<P> {
  provider: P,
  segment: Option<Segment>,
  seglist: SegList,
  size: u32,
}

impl<P: PageProvider> Heap<P> {
  pub const fn new(provider: P) -> Self {
    Self { provider, segment: None, seglist: SegList::new(), size: 0 }
  }

  /// Establishes (or re-establishes) the heap as one large free block.
  ///
  /// Idempotent: calling `init` again asks the page provider for a fresh
  /// segment and discards all prior allocator state. Returns `false` if
  /// the provider refuses the initial grant.
  pub fn init(&mut self) -> bool {
    let Some(base) = self.provider.init_segment(INIT_NPAGES) else {
      log::warn!("heap init failed: page provider refused {INIT_NPAGES} pages");
      return false;
    };

    let seg = unsafe { Segment::new(base) };
    self.segment = Some(seg);
    self.seglist.reset();
    self.size = (INIT_NPAGES * PAGE_SIZE) as u32;

    let free_bp: Offset = ALIGNMENT;
    let payload = self.size - ALIGNMENT - HDR_SIZE;

    unsafe {
      seg.write_header(free_bp, payload, false, true);
      seg.write_footer(free_bp);
      self.seglist.insert(seg, free_bp);

      let epilogue = seg.next_block(free_bp);
      seg.write_header(epilogue, 0, true, false);
    }

    log::debug!("heap initialized: {} bytes, one free block of {} bytes", self.size, payload);
    true
  }

  #[inline]
  fn find_fit(&self, seg: Segment, target: u32) -> Option<Offset> {
    #[cfg(feature = "best_fit")]
    {
      unsafe { self.seglist.best_fit(seg, target) }
    }
    #[cfg(not(feature = "best_fit"))]
    {
      unsafe { self.seglist.first_fit(seg, target) }
    }
  }

  /// Services a search miss by growing the segment, formatting the new
  /// pages as a free block (folding them into the old tail block if it was
  /// free), and writing a fresh epilogue header.
  ///
  /// Returns the offset of the block now available to satisfy `target`
  /// bytes, or `None` if the provider refused to grow.
  fn extend_for(&mut self, seg: Segment, target: u32) -> Option<Offset> {
    let bytes = crate::align_up!(target, PAGE_SIZE as u32);
    let pages = bytes / PAGE_SIZE as u32;

    let new_base = self.provider.extend_segment(pages as usize)?;
    debug_assert_eq!(
      new_base.as_ptr() as usize,
      seg.base_ptr() as usize + self.size as usize,
      "page provider must extend the segment contiguously"
    );

    // The old epilogue header's slot becomes the new block's header.
    let block: Offset = self.size - HDR_SIZE;
    self.size += bytes;

    let merged = unsafe {
      if !seg.get_prev_alloc(block) {
        let prev = seg.prev_block(block);
        let prev_size = seg.get_hdr_size(prev);
        let new_size = prev_size + bytes;
        seg.set_hdr_size(prev, new_size);
        seg.write_footer(prev);
        self.seglist.migrate(seg, prev, prev_size, new_size);
        prev
      } else {
        seg.write_header(block, bytes - HDR_SIZE, false, true);
        seg.write_footer(block);
        self.seglist.insert(seg, block);
        block
      }
    };

    unsafe {
      let epilogue = seg.next_block(merged);
      seg.write_header(epilogue, 0, true, false);
    }

    log::debug!("extended heap by {bytes} bytes ({pages} pages)");
    Some(merged)
  }

  /// Splits a free block into an allocated tail of `alloc_size` bytes and a
  /// free remainder of `free_size` bytes, returning the tail's offset.
  ///
  /// The free remainder keeps `block`'s address, preserving the original
  /// block's locality in the free list; the allocated tail is fresh.
  ///
  /// # Safety
  /// `block` must already be unlinked from the free list, and
  /// `free_size + alloc_size + HDR_SIZE` must equal its current size.
  unsafe fn split(&mut self, seg: Segment, block: Offset, alloc_size: u32, free_size: u32) -> Offset {
    let prev_alloc = unsafe { seg.get_prev_alloc(block) };

    unsafe {
      seg.write_header(block, free_size, false, prev_alloc);
      seg.write_footer(block);
      self.seglist.insert(seg, block);

      let tail = seg.next_block(block);
      seg.write_header(tail, alloc_size, true, false);

      let after = seg.next_block(tail);
      seg.set_prev_alloc(after, true);

      tail
    }
  }

  /// Allocates at least `n` bytes, returning an 8-byte-aligned pointer, or
  /// `None` if `n == 0` or the request cannot be satisfied (including by
  /// growing the segment).
  pub fn allocate(&mut self, n: usize) -> Option<NonNull<u8>> {
    if n == 0 {
      return None;
    }
    let seg = self.segment?;
    let s = block::adjust_request(n)?;

    let block = match self.find_fit(seg, s) {
      Some(block) => block,
      None => self.extend_for(seg, s)?,
    };

    let total = unsafe { seg.get_hdr_size(block) };
    unsafe { self.seglist.unlink(seg, block, bucket_of(total)) };

    let remainder = total as i64 - s as i64 - HDR_SIZE as i64;
    let result = if remainder < MIN_PAYLOAD as i64 {
      unsafe {
        seg.set_curr_alloc(block, true);
        seg.set_prev_alloc(seg.next_block(block), true);
      }
      block
    } else {
      unsafe { self.split(seg, block, s, remainder as u32) }
    };

    let ptr = unsafe { seg.payload_ptr(result) };
    log::trace!("allocate({n}) -> {:p}", ptr.as_ptr());
    Some(ptr)
  }

  /// Frees a block merging eagerly with any free neighbor(s). `None` is a no-op.
  pub fn free(&mut self, ptr: Option<NonNull<u8>>) {
    let Some(ptr) = ptr else { return };
    let Some(seg) = self.segment else { return };

    let bp = unsafe { seg.offset_of(ptr) };
    unsafe { self.coalesce(seg, bp) };
  }

  /// Merges a just-freed block with its free neighbors, in place. Returns
  /// the resulting free block's offset (the merge target may not be `bp`
  /// itself, if the previous block absorbed it).
  ///
  /// # Safety
  /// `bp` must be a currently-allocated block's payload offset.
  unsafe fn coalesce(&mut self, seg: Segment, bp: Offset) -> Offset {
    unsafe {
      let next = seg.next_block(bp);
      let prev_alloc = seg.get_prev_alloc(bp);
      let next_alloc = seg.get_curr_alloc(next);
      let curr_size = seg.get_hdr_size(bp);
      let next_size = seg.get_hdr_size(next);

      match (prev_alloc, next_alloc) {
        (true, true) => {
          seg.set_curr_alloc(bp, false);
          seg.write_footer(bp);
          seg.set_prev_alloc(next, false);
          self.seglist.insert(seg, bp);
          bp
        }
        (true, false) => {
          let new_size = curr_size + next_size + HDR_SIZE;
          seg.set_hdr_size(bp, new_size);
          seg.set_curr_alloc(bp, false);
          seg.write_footer(bp);
          self.seglist.unlink(seg, next, bucket_of(next_size));
          self.seglist.insert(seg, bp);
          bp
        }
        (false, true) => {
          let prev = seg.prev_block(bp);
          let prev_size = seg.get_hdr_size(prev);
          let new_size = prev_size + curr_size + HDR_SIZE;
          seg.set_hdr_size(prev, new_size);
          seg.write_footer(prev);
          self.seglist.migrate(seg, prev, prev_size, new_size);
          seg.set_prev_alloc(next, false);
          prev
        }
        (false, false) => {
          let prev = seg.prev_block(bp);
          let prev_size = seg.get_hdr_size(prev);
          let new_size = prev_size + curr_size + next_size + 2 * HDR_SIZE;
          self.seglist.unlink(seg, next, bucket_of(next_size));
          seg.set_hdr_size(prev, new_size);
          seg.write_footer(prev);
          self.seglist.migrate(seg, prev, prev_size, new_size);
          prev
        }
      }
    }
  }

  /// Resizes a previous allocation. See the module docs on the three
  /// reuse/absorb/copy strategies this tries, in order.
  ///
  /// `reallocate(None, n)` behaves as `allocate(n)`; `reallocate(p, 0)`
  /// behaves as `free(p)` and returns `None` (this allocator's own `free`,
  /// not the C library's — a deliberate fix over the design this grew
  /// from, which called the latter).
  pub fn reallocate(&mut self, ptr: Option<NonNull<u8>>, n: usize) -> Option<NonNull<u8>> {
    let Some(ptr) = ptr else {
      return self.allocate(n);
    };
    if n == 0 {
      self.free(Some(ptr));
      return None;
    }

    let seg = self.segment?;
    let bp = unsafe { seg.offset_of(ptr) };
    let old = unsafe { seg.get_hdr_size(bp) };
    let s = block::adjust_request(n)?;

    if s < old {
      return Some(ptr);
    }

    let next = unsafe { seg.next_block(bp) };
    if unsafe { !seg.get_curr_alloc(next) } {
      let next_size = unsafe { seg.get_hdr_size(next) };
      let combined = old + next_size + HDR_SIZE;
      if s < combined {
        unsafe {
          let after = seg.next_block(next);
          seg.set_prev_alloc(after, true);
          seg.set_hdr_size(bp, combined);
          seg.write_footer(bp);
          self.seglist.unlink(seg, next, bucket_of(next_size));
        }
        return Some(ptr);
      }
    }

    let new_ptr = self.allocate(n)?;
    unsafe {
      let copy_len = (old as usize).min(n);
      core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), copy_len);
    }
    self.free(Some(ptr));
    Some(new_ptr)
  }

  pub(crate) fn segment(&self) -> Option<Segment> {
    self.segment
  }

  pub(crate) fn seglist(&self) -> &SegList {
    &self.seglist
  }

  pub(crate) fn size(&self) -> u32 {
    self.size
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::page::ArenaProvider;

  fn heap_with_pages(npages: usize) -> Heap<ArenaProvider> {
    let mut heap = Heap::new(ArenaProvider::with_capacity((npages + 8) * PAGE_SIZE));
    assert!(heap.init());
    heap
  }

  fn is_aligned(ptr: NonNull<u8>) -> bool {
    (ptr.as_ptr() as usize) % ALIGNMENT as usize == 0
  }

  #[test]
  fn allocate_zero_returns_none() {
    let mut heap = heap_with_pages(INIT_NPAGES);
    assert!(heap.allocate(0).is_none());
  }

  #[test]
  fn free_null_is_noop() {
    let mut heap = heap_with_pages(INIT_NPAGES);
    heap.free(None);
  }

  #[test]
  fn reallocate_null_behaves_as_allocate() {
    let mut heap = heap_with_pages(INIT_NPAGES);
    let p = heap.reallocate(None, 32);
    assert!(p.is_some());
  }

  #[test]
  fn reallocate_to_zero_frees_and_returns_none() {
    let mut heap = heap_with_pages(INIT_NPAGES);
    let p = heap.allocate(32).unwrap();
    assert!(heap.reallocate(Some(p), 0).is_none());
  }

  #[test]
  fn first_allocation_after_init_is_aligned_and_at_expected_offset() {
    let mut heap = heap_with_pages(INIT_NPAGES);
    let base = heap.segment().unwrap().base_ptr();
    let p = heap.allocate(8).unwrap();
    assert!(is_aligned(p));
    assert_eq!(p.as_ptr() as usize - base as usize, 8);
  }

  #[test]
  fn allocations_never_overlap() {
    let mut heap = heap_with_pages(INIT_NPAGES);
    let sizes = [8usize, 24, 1, 4000, 16, 4096];
    let mut ranges = Vec::new();

    for &n in &sizes {
      let p = heap.allocate(n).expect("allocation should succeed");
      ranges.push((p.as_ptr() as usize, n));
    }

    for i in 0..ranges.len() {
      for j in (i + 1)..ranges.len() {
        let (a_start, a_len) = ranges[i];
        let (b_start, b_len) = ranges[j];
        let overlap = a_start < b_start + b_len && b_start < a_start + a_len;
        assert!(!overlap, "allocations {i} and {j} overlap");
      }
    }
  }

  #[test]
  fn freeing_both_neighbors_coalesces_into_one_block() {
    let mut heap = heap_with_pages(INIT_NPAGES);
    let a = heap.allocate(16).unwrap();
    let b = heap.allocate(16).unwrap();
    heap.free(Some(a));
    heap.free(Some(b));

    let seg = heap.segment().unwrap();
    let a_off = unsafe { seg.offset_of(a) };
    unsafe {
      assert!(!seg.get_curr_alloc(a_off), "merged block should be free");
      assert_eq!(seg.get_hdr_size(a_off), 16 + 16 + HDR_SIZE);
    }
  }

  #[test]
  fn allocating_beyond_initial_pages_extends_the_segment() {
    let mut heap = heap_with_pages(8);
    let before = heap.size();
    for _ in 0..3 {
      heap.allocate(4000).expect("allocation should succeed");
    }
    assert!(heap.size() > before, "segment should have grown to satisfy the third request");
  }

  #[test]
  fn allocate_beyond_provider_capacity_fails_cleanly() {
    let mut heap = Heap::new(ArenaProvider::with_capacity(INIT_NPAGES * PAGE_SIZE));
    assert!(heap.init());
    let before = heap.size();
    assert!(heap.allocate(10 * PAGE_SIZE).is_none());
    assert_eq!(heap.size(), before, "a failed grow must not mutate accounted size");
  }

  #[test]
  fn reallocate_growing_into_free_neighbor_keeps_pointer() {
    let mut heap = heap_with_pages(INIT_NPAGES);
    let a = heap.allocate(16).unwrap();
    let b = heap.allocate(16).unwrap();
    heap.free(Some(b));

    let grown = heap.reallocate(Some(a), 16 + 16 + 4).unwrap();
    assert_eq!(grown.as_ptr(), a.as_ptr(), "growing into a free neighbor must reuse the pointer");
  }

  #[test]
  fn reallocate_growing_past_free_neighbor_moves_and_copies() {
    let mut heap = heap_with_pages(INIT_NPAGES);
    let a = heap.allocate(16).unwrap();
    unsafe { a.as_ptr().write_bytes(0xAB, 16) };
    let b = heap.allocate(16).unwrap();
    heap.free(Some(b));

    // Ask for more than `a`'s neighbor can satisfy, forcing a move.
    let moved = heap.reallocate(Some(a), 4096).unwrap();
    assert_ne!(moved.as_ptr(), a.as_ptr());
    let bytes = unsafe { core::slice::from_raw_parts(moved.as_ptr(), 16) };
    assert_eq!(bytes, [0xABu8; 16]);
  }

  #[test]
  fn reallocate_shrinking_reuses_the_pointer() {
    let mut heap = heap_with_pages(INIT_NPAGES);
    let p = heap.allocate(4000).unwrap();
    let shrunk = heap.reallocate(Some(p), 8).unwrap();
    assert_eq!(shrunk.as_ptr(), p.as_ptr());
  }

  #[test]
  fn pathological_fragmentation_every_other_block_freed() {
    let mut heap = heap_with_pages(64);
    let mut ptrs = Vec::new();
    for _ in 0..1000 {
      ptrs.push(heap.allocate(16).expect("allocation should succeed"));
    }
    for (i, p) in ptrs.into_iter().enumerate() {
      if i % 2 == 0 {
        heap.free(Some(p));
      }
    }
    // A small allocation should still be serviceable from one of the holes.
    assert!(heap.allocate(16).is_some());
  }
}
