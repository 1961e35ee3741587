//! Typed data blocks.
//!
//! [`RawBuffer`] is a pointer plus a slot count. It does not know how many
//! slots are initialised; callers pass `len` to every operation that touches
//! elements. All pointer arithmetic on element storage lives here.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::mem;
use std::ptr::{self, NonNull};
use std::slice;

use crate::allocator::BufferAlloc;
use crate::error::AllocError;

/// An uninitialised-by-default block of `capacity` slots of `T`.
///
/// Zero-sized blocks (capacity 0, or any capacity of a zero-sized `T`) use a
/// dangling pointer and never reach the allocator.
#[derive(Debug)]
pub(crate) struct RawBuffer<T> {
    ptr: NonNull<T>,
    capacity: usize,
}

impl<T> RawBuffer<T> {
    fn layout(capacity: usize) -> Result<Layout, AllocError> {
        Layout::array::<T>(capacity).map_err(|_| AllocError::CapacityOverflow {
            requested: capacity,
        })
    }

    fn current_layout(&self) -> Layout {
        Self::layout(self.capacity).expect("layout was validated when the block was allocated")
    }

    /// Allocate a block of `capacity` slots.
    pub(crate) fn allocate<A: BufferAlloc>(capacity: usize, alloc: &A) -> Result<Self, AllocError> {
        let layout = Self::layout(capacity)?;
        if layout.size() == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                capacity,
            });
        }
        let ptr = alloc.allocate(layout).ok_or(AllocError::AllocFailed {
            bytes: layout.size(),
        })?;
        Ok(Self {
            ptr: ptr.cast(),
            capacity,
        })
    }

    /// Allocate a block of `capacity` slots and clone `src` into its prefix.
    ///
    /// If a `clone` panics, the clones made so far are dropped and the block
    /// is freed before the panic continues.
    pub(crate) fn clone_from_slice<A: BufferAlloc>(
        src: &[T],
        capacity: usize,
        alloc: &A,
    ) -> Result<Self, AllocError>
    where
        T: Clone,
    {
        debug_assert!(src.len() <= capacity);
        let buf = Self::allocate(capacity, alloc)?;

        struct PartialClone<'b, T, A: BufferAlloc> {
            buf: &'b RawBuffer<T>,
            written: usize,
            alloc: &'b A,
        }

        impl<T, A: BufferAlloc> Drop for PartialClone<'_, T, A> {
            fn drop(&mut self) {
                // SAFETY: exactly `written` slots were initialised, and the
                // block is owned by nobody else yet.
                unsafe {
                    ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                        self.buf.as_ptr(),
                        self.written,
                    ));
                    self.buf.deallocate_block(self.alloc);
                }
            }
        }

        let mut guard = PartialClone {
            buf: &buf,
            written: 0,
            alloc,
        };
        for item in src {
            // SAFETY: `written < src.len() <= capacity`.
            unsafe { buf.as_ptr().add(guard.written).write(item.clone()) };
            guard.written += 1;
        }
        mem::forget(guard);
        Ok(buf)
    }

    /// A second handle to the same block.
    ///
    /// The block is freed by whichever handle the caller designates; the
    /// holder count in `SharedCount` decides which one that is.
    pub(crate) fn alias(&self) -> Self {
        Self {
            ptr: self.ptr,
            capacity: self.capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// # Safety
    ///
    /// The first `len` slots must be initialised.
    pub(crate) unsafe fn slice(&self, len: usize) -> &[T] {
        debug_assert!(len <= self.capacity);
        // SAFETY: caller guarantees `len` initialised slots.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), len) }
    }

    /// # Safety
    ///
    /// The first `len` slots must be initialised and no other reference into
    /// the block may be live.
    pub(crate) unsafe fn slice_mut(&mut self, len: usize) -> &mut [T] {
        debug_assert!(len <= self.capacity);
        // SAFETY: caller guarantees `len` initialised, unaliased slots.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), len) }
    }

    /// Grow to `new_capacity` slots, keeping the first `len` elements.
    ///
    /// With `in_place` the block goes through [`BufferAlloc::reallocate`];
    /// otherwise a new block is allocated, the elements are moved across and
    /// the old block is freed. On failure the buffer is unchanged.
    ///
    /// # Safety
    ///
    /// The first `len` slots must be initialised and the block must not be
    /// referenced by anyone else.
    pub(crate) unsafe fn grow<A: BufferAlloc>(
        &mut self,
        len: usize,
        new_capacity: usize,
        alloc: &A,
        in_place: bool,
    ) -> Result<(), AllocError> {
        debug_assert!(len <= self.capacity && new_capacity > self.capacity);
        let new_layout = Self::layout(new_capacity)?;
        if new_layout.size() == 0 {
            self.capacity = new_capacity;
            return Ok(());
        }

        let old_layout = self.current_layout();
        if old_layout.size() == 0 {
            // Nothing to carry over: an empty block of a sized `T` holds no elements.
            *self = Self::allocate(new_capacity, alloc)?;
            return Ok(());
        }

        if in_place {
            // SAFETY: the block came from `alloc` with `old_layout`, and
            // `new_layout` was validated above.
            let ptr = unsafe { alloc.reallocate(self.ptr.cast(), old_layout, new_layout.size()) }
                .ok_or(AllocError::AllocFailed {
                    bytes: new_layout.size(),
                })?;
            self.ptr = ptr.cast();
            self.capacity = new_capacity;
            return Ok(());
        }

        let fresh = Self::allocate(new_capacity, alloc)?;
        for i in 0..len {
            // SAFETY: slot `i` is initialised in the old block and in bounds
            // of the new one. Each element is read exactly once; the old
            // block is freed below without dropping anything.
            unsafe { fresh.as_ptr().add(i).write(self.as_ptr().add(i).read()) };
        }
        let old = mem::replace(self, fresh);
        // SAFETY: every element has been moved out of `old`.
        unsafe { old.deallocate_block(alloc) };
        Ok(())
    }

    /// Drop the first `len` elements in order, then free the block.
    ///
    /// # Safety
    ///
    /// The first `len` slots must be initialised, the block must not be
    /// referenced by anyone else, and `alloc` must be the allocator (or a
    /// clone) that produced it.
    pub(crate) unsafe fn destroy<A: BufferAlloc>(mut self, len: usize, alloc: &A) {
        // SAFETY: forwarded from the caller's contract.
        unsafe {
            ptr::drop_in_place(self.slice_mut(len));
            self.deallocate_block(alloc);
        }
    }

    /// Free the block without dropping any element.
    ///
    /// # Safety
    ///
    /// No live element may remain in the block, and the block must not be
    /// used afterwards.
    unsafe fn deallocate_block<A: BufferAlloc>(&self, alloc: &A) {
        let layout = self.current_layout();
        if layout.size() > 0 {
            // SAFETY: the block came from `alloc` with this layout.
            unsafe { alloc.deallocate(self.ptr.cast(), layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Global;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn zero_capacity_block_round_trip() {
        let buf = RawBuffer::<u32>::allocate(0, &Global).unwrap();
        assert_eq!(buf.capacity(), 0);
        unsafe { buf.destroy(0, &Global) };
    }

    #[test]
    fn zero_sized_elements_use_dangling_block() {
        let mut buf = RawBuffer::<()>::allocate(8, &Global).unwrap();
        unsafe {
            buf.grow(0, 32, &Global, true).unwrap();
            assert_eq!(buf.capacity(), 32);
            buf.destroy(0, &Global);
        }
    }

    #[test]
    fn capacity_overflow_is_reported() {
        let err = RawBuffer::<u64>::allocate(usize::MAX, &Global).unwrap_err();
        assert_eq!(
            err,
            AllocError::CapacityOverflow {
                requested: usize::MAX
            }
        );
    }

    #[test]
    fn clone_from_slice_copies_prefix() {
        let src = vec![String::from("a"), String::from("b")];
        let buf = RawBuffer::clone_from_slice(&src, 5, &Global).unwrap();
        assert_eq!(buf.capacity(), 5);
        unsafe {
            assert_eq!(buf.slice(2), &src[..]);
            buf.destroy(2, &Global);
        }
    }

    #[test]
    fn grow_preserves_elements_both_ways() {
        for in_place in [true, false] {
            let mut buf = RawBuffer::clone_from_slice(&[1u64, 2, 3], 3, &Global).unwrap();
            unsafe {
                buf.grow(3, 10, &Global, in_place).unwrap();
                assert_eq!(buf.capacity(), 10);
                assert_eq!(buf.slice(3), &[1, 2, 3]);
                buf.destroy(3, &Global);
            }
        }
    }

    #[derive(Debug)]
    struct Bomb {
        drops: Rc<Cell<usize>>,
        clones_left: Rc<Cell<usize>>,
    }

    impl Clone for Bomb {
        fn clone(&self) -> Self {
            let left = self.clones_left.get();
            if left == 0 {
                panic!("clone budget exhausted");
            }
            self.clones_left.set(left - 1);
            Bomb {
                drops: Rc::clone(&self.drops),
                clones_left: Rc::clone(&self.clones_left),
            }
        }
    }

    impl Drop for Bomb {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn panicking_clone_drops_partial_copies() {
        let drops = Rc::new(Cell::new(0));
        let clones_left = Rc::new(Cell::new(2));
        let src: Vec<Bomb> = (0..4)
            .map(|_| Bomb {
                drops: Rc::clone(&drops),
                clones_left: Rc::clone(&clones_left),
            })
            .collect();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            RawBuffer::clone_from_slice(&src, 4, &Global)
        }));
        assert!(result.is_err());
        // The two successful clones were dropped during unwinding.
        assert_eq!(drops.get(), 2);
        drop(src);
        assert_eq!(drops.get(), 6);
    }
}
