//! # segalloc - A Segregated Free List Allocator
//!
//! This crate grew out of a simple bump allocator; this version replaces
//! the bump pointer with a boundary-tag, segregated-explicit-free-list
//! design in the style of a textbook malloc implementation. It still
//! grows its backing segment the same way its ancestor did — one page
//! source at a time — but it can now reuse freed memory instead of only
//! ever growing.
//!
//! ## Overview
//!
//! ```text
//!   Segregated Free List Concept:
//!
//!   buckets[0]  (1-15 B)    -> []
//!   buckets[1]  (16-31 B)   -> [free] -> [free]
//!   buckets[2]  (32-63 B)   -> []
//!   ...
//!   buckets[10] (~8-16 KiB) -> [free]
//!   ...
//!   buckets[29] (huge)      -> []
//!
//!   allocate(n) rounds n up to a size class, searches that bucket and the
//!   ones above it for a fit, and splits off any leftover as a smaller
//!   free block. free(p) merges the freed block with any free neighbor
//!   before reinserting it, so adjacent free blocks never accumulate.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - power-of-two rounding macro
//!   ├── block      - boundary-tag header/footer/link primitives (Segment)
//!   ├── seglist    - the 30-bucket segregated free list
//!   ├── page       - page provider trait + sbrk/arena implementations
//!   ├── allocator  - init/allocate/free/reallocate, split/coalesce
//!   └── validate   - heap-walking invariant checks, print_* stubs
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{Heap, ArenaProvider};
//!
//! // ArenaProvider backs the heap with an owned buffer instead of sbrk,
//! // which keeps this example self-contained and safe to run concurrently
//! // with the rest of the test suite. Swap in `SbrkProvider::new()` (with
//! // the `SbrkHeap` alias) to grow the real process heap instead.
//! let mut heap = Heap::new(ArenaProvider::with_capacity(64 * 1024));
//! assert!(heap.init());
//!
//! let ptr = heap.allocate(64).expect("allocation should succeed");
//! unsafe { ptr.as_ptr().write_bytes(0, 64) };
//!
//! let grown = heap.reallocate(Some(ptr), 128).expect("reallocation should succeed");
//! heap.free(Some(grown));
//! ```
//!
//! ## How It Works
//!
//! Each block is a 4-byte boundary-tag header immediately followed by a
//! payload: allocated blocks have no footer (the payload is fully
//! user-visible), free blocks sacrifice their first 8 payload bytes to a
//! next/prev free-list link and their last 4 to a footer mirroring the
//! header, which is what makes backward coalescing O(1).
//!
//! ```text
//!   Free block:
//!   ┌────────┬──────────────┬──────────────┬─────...─────┬────────┐
//!   │ header │ next (4 B)   │ prev (4 B)   │   unused     │ footer │
//!   └────────┴──────────────┴──────────────┴─────...─────┴────────┘
//!
//!   Allocated block:
//!   ┌────────┬───────────────────────────────────────────────────┐
//!   │ header │                  user payload                     │
//!   └────────┴───────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Segregated fit search**: 30 size-class buckets, bounded scans per bucket
//! - **Eager coalescing**: adjacent free blocks never persist across calls
//! - **In-place growth**: `reallocate` absorbs a free successor before copying
//! - **Pluggable page source**: `sbrk` in production, an owned arena in tests
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **Never shrinks**: pages are never returned to the provider
//! - **8-byte alignment only**: no support for stricter alignment requests
//!
//! ## Safety
//!
//! This crate is inherently unsafe, as it deals with raw memory management
//! over a byte buffer it did not allocate through Rust's normal ownership
//! machinery. The unsafe pointer arithmetic is concentrated in
//! [`block::Segment`]; the allocator core and public API operate on
//! `Offset` values and `NonNull<u8>` pointers instead of raw pointers.

pub mod align;
mod allocator;
mod block;
pub mod page;
mod seglist;
mod validate;

pub use allocator::Heap;
pub use page::{ArenaProvider, PageProvider, SbrkProvider, PAGE_SIZE};

/// The production instantiation, growing the real process heap via `sbrk`.
pub type SbrkHeap = Heap<SbrkProvider>;
