//! Page provider: the sbrk-style collaborator this allocator grows against.
//!
//! The allocator treats its memory source as an opaque, monotonically
//! growing segment — it never gives pages back. [`PageProvider`] captures
//! that contract; [`SbrkProvider`] is the production implementation (built
//! on `libc::sbrk`, same as this crate's bump-allocator ancestor), and
//! [`ArenaProvider`] is a deterministic, non-global stand-in used in tests
//! so parallel test threads don't fight over the same process break.

use core::ptr::NonNull;
use libc::{c_void, intptr_t, sbrk};

/// Page size in bytes. Must be `>= 16` and a multiple of 8.
pub const PAGE_SIZE: usize = 4096;

/// A monotonic source of page-aligned memory.
///
/// Implementations hand out a contiguous, ever-growing region: `init_segment`
/// establishes it, `extend_segment` appends more pages directly after the
/// current end, and `segment_size` reports the current total. None of these
/// ever fail except by returning `None`/reporting an unchanged size — the
/// allocator does not expect panics from its page source.
pub trait PageProvider {
  /// Establishes a fresh segment of `npages` pages, discarding any prior one.
  fn init_segment(&mut self, npages: usize) -> Option<NonNull<u8>>;

  /// Appends `npages` pages directly after the current segment end.
  fn extend_segment(&mut self, npages: usize) -> Option<NonNull<u8>>;

  /// Current total segment size in bytes.
  fn segment_size(&self) -> usize;
}

/// Grows the process heap via `sbrk(2)`, exactly like this crate's
/// bump-allocator ancestor. Single-threaded only — `sbrk` serializes on the
/// one global process break, so mixing this with any other `sbrk`-based
/// allocator (including the system one, in most libc implementations) is
/// unsound.
#[derive(Default)]
pub struct SbrkProvider {
  base: Option<NonNull<u8>>,
  size: usize,
}

impl SbrkProvider {
  pub const fn new() -> Self {
    Self { base: None, size: 0 }
  }

  unsafe fn grow(&mut self, bytes: usize) -> Option<NonNull<u8>> {
    let raw = unsafe { sbrk(bytes as intptr_t) };
    if raw == usize::MAX as *mut c_void {
      log::warn!("sbrk failed requesting {bytes} bytes");
      return None;
    }
    NonNull::new(raw as *mut u8)
  }
}

impl PageProvider for SbrkProvider {
  fn init_segment(&mut self, npages: usize) -> Option<NonNull<u8>> {
    let bytes = npages * PAGE_SIZE;
    let base = unsafe { self.grow(bytes) }?;
    self.base = Some(base);
    self.size = bytes;
    Some(base)
  }

  fn extend_segment(&mut self, npages: usize) -> Option<NonNull<u8>> {
    let bytes = npages * PAGE_SIZE;
    let extension = unsafe { self.grow(bytes) }?;
    self.size += bytes;
    Some(extension)
  }

  fn segment_size(&self) -> usize {
    self.size
  }
}

/// A fixed-capacity arena backing the same [`PageProvider`] contract,
/// without touching the real process break.
///
/// Useful for tests and for embedding this allocator over memory the
/// caller already owns (e.g. a `static` buffer). `init_segment` resets the
/// arena; `extend_segment` hands out the next unused slice. Growth fails
/// once the backing buffer is exhausted, mirroring what a real page
/// provider does when the OS refuses more memory.
pub struct ArenaProvider {
  buf: Box<[u8]>,
  used: usize,
}

impl ArenaProvider {
  pub fn with_capacity(bytes: usize) -> Self {
    Self { buf: vec![0u8; bytes].into_boxed_slice(), used: 0 }
  }
}

impl PageProvider for ArenaProvider {
  fn init_segment(&mut self, npages: usize) -> Option<NonNull<u8>> {
    let bytes = npages * PAGE_SIZE;
    if bytes > self.buf.len() {
      return None;
    }
    self.used = bytes;
    NonNull::new(self.buf.as_mut_ptr())
  }

  fn extend_segment(&mut self, npages: usize) -> Option<NonNull<u8>> {
    let bytes = npages * PAGE_SIZE;
    if self.used + bytes > self.buf.len() {
      return None;
    }
    let base = unsafe { self.buf.as_mut_ptr().add(self.used) };
    self.used += bytes;
    NonNull::new(base)
  }

  fn segment_size(&self) -> usize {
    self.used
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn arena_init_then_extend_is_contiguous() {
    let mut arena = ArenaProvider::with_capacity(8 * PAGE_SIZE);
    let base = arena.init_segment(3).unwrap();
    assert_eq!(arena.segment_size(), 3 * PAGE_SIZE);

    let ext = arena.extend_segment(2).unwrap();
    assert_eq!(arena.segment_size(), 5 * PAGE_SIZE);
    assert_eq!(ext.as_ptr() as usize, base.as_ptr() as usize + 3 * PAGE_SIZE);
  }

  #[test]
  fn arena_refuses_growth_past_capacity() {
    let mut arena = ArenaProvider::with_capacity(4 * PAGE_SIZE);
    assert!(arena.init_segment(3).is_some());
    assert!(arena.extend_segment(2).is_none());
    // Capacity exhaustion must not corrupt the existing accounting.
    assert_eq!(arena.segment_size(), 3 * PAGE_SIZE);
  }

  #[test]
  fn arena_reinit_resets_usage() {
    let mut arena = ArenaProvider::with_capacity(8 * PAGE_SIZE);
    arena.init_segment(3).unwrap();
    arena.extend_segment(2).unwrap();
    arena.init_segment(1).unwrap();
    assert_eq!(arena.segment_size(), PAGE_SIZE);
  }
}
