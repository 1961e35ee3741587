//! Allocator seam for buffer and counter storage.
//!
//! [`BufferAlloc`] is the narrow interface the container allocates through.
//! [`Global`] forwards to the system allocator; tests substitute an
//! allocator that can be exhausted on demand.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Source of raw memory blocks.
///
/// Failure is reported as `None`, never by panicking or aborting. Clones of
/// an allocator must be able to reallocate and free each other's blocks,
/// since every container sharing a buffer carries its own clone.
///
/// Callers never pass a zero-sized layout.
pub trait BufferAlloc: Clone {
    /// Allocate an uninitialised block for `layout`.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Resize a block to `new_size` bytes, in place or at a new address.
    ///
    /// On success the first `old.size()` bytes are preserved and the old
    /// pointer must no longer be used. On failure the old block is untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator (or a clone) for
    /// `old`, and `new_size` must be non-zero and, rounded up to
    /// `old.align()`, must not overflow `isize`.
    unsafe fn reallocate(&self, ptr: NonNull<u8>, old: Layout, new_size: usize)
        -> Option<NonNull<u8>>;

    /// Release a block.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator (or a clone) for
    /// `layout` and not released since.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process-wide system allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Global;

impl BufferAlloc for Global {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0, "zero-sized allocation");
        // SAFETY: callers never request a zero-sized layout.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        // SAFETY: forwarded from the caller's contract.
        NonNull::new(unsafe { alloc::realloc(ptr.as_ptr(), old, new_size) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}
