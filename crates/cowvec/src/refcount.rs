//! The shared holder counter.
//!
//! Every owned buffer is paired with one [`SharedCount`], a separate
//! allocation holding the number of containers that currently reference the
//! buffer. The counter is a plain `Cell<usize>`: containers are `!Send` and
//! `!Sync`, so no two threads can ever touch the same counter.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;

use crate::allocator::BufferAlloc;
use crate::error::AllocError;

/// Handle to a heap-allocated holder count.
///
/// The handle is `Copy`; copying it does not change the count. The count is
/// adjusted explicitly through [`increment`](Self::increment) and
/// [`decrement`](Self::decrement), and the allocation is freed with
/// [`release`](Self::release) once it reaches zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SharedCount {
    ptr: NonNull<Cell<usize>>,
}

impl SharedCount {
    const LAYOUT: Layout = Layout::new::<Cell<usize>>();

    /// Allocate a counter initialised to 1.
    pub(crate) fn allocate<A: BufferAlloc>(alloc: &A) -> Result<Self, AllocError> {
        let ptr = alloc
            .allocate(Self::LAYOUT)
            .ok_or(AllocError::AllocFailed {
                bytes: Self::LAYOUT.size(),
            })?
            .cast::<Cell<usize>>();
        // SAFETY: freshly allocated with the layout of `Cell<usize>`.
        unsafe { ptr.as_ptr().write(Cell::new(1)) };
        Ok(Self { ptr })
    }

    fn cell(&self) -> &Cell<usize> {
        // SAFETY: the allocation outlives every handle that can still reach
        // it; `release` is only called once the count has dropped to zero.
        unsafe { self.ptr.as_ref() }
    }

    /// Current number of holders.
    pub(crate) fn get(&self) -> usize {
        self.cell().get()
    }

    /// Register one more holder.
    pub(crate) fn increment(&self) {
        let cell = self.cell();
        let next = cell.get().checked_add(1);
        cell.set(next.unwrap_or_else(|| std::process::abort()));
    }

    /// Unregister one holder, returning the remaining count.
    pub(crate) fn decrement(&self) -> usize {
        let cell = self.cell();
        let current = cell.get();
        debug_assert!(current > 0, "holder count underflow");
        cell.set(current - 1);
        current - 1
    }

    /// Free the counter allocation.
    ///
    /// # Safety
    ///
    /// The count must be zero and no other copy of this handle may be used
    /// afterwards. `alloc` must be the allocator (or a clone of it) that
    /// created the counter.
    pub(crate) unsafe fn release<A: BufferAlloc>(self, alloc: &A) {
        debug_assert_eq!(self.get(), 0, "releasing a counter that is still held");
        // SAFETY: allocated by `allocate` with `LAYOUT`; caller guarantees
        // this is the last use.
        unsafe { alloc.deallocate(self.ptr.cast(), Self::LAYOUT) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Global;

    #[test]
    fn starts_at_one() {
        let count = SharedCount::allocate(&Global).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(count.decrement(), 0);
        unsafe { count.release(&Global) };
    }

    #[test]
    fn copies_observe_the_same_count() {
        let count = SharedCount::allocate(&Global).unwrap();
        let other = count;
        other.increment();
        other.increment();
        assert_eq!(count.get(), 3);
        assert_eq!(count.decrement(), 2);
        assert_eq!(other.get(), 2);
        count.decrement();
        other.decrement();
        unsafe { count.release(&Global) };
    }
}
