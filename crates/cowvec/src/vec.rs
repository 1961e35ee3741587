//! The copy-on-write vector.
//!
//! [`CowVec`] tracks one of three ownership states for its storage:
//!
//! ```text
//! Borrowed { slice, capacity }     caller memory, never written or freed
//! Owned { buf, count }, count == 1 exclusive: mutated in place
//! Owned { buf, count }, count  > 1 shared: cloned before the first write
//! ```
//!
//! Every path that writes element storage goes through
//! [`CowVec::make_exclusive`] or the grow path, which share a single clone
//! routine. Cloning a `CowVec` only bumps the holder count.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::Index;

use log::{debug, trace};

use crate::allocator::{BufferAlloc, Global};
use crate::config::GrowthFactor;
use crate::error::AllocError;
use crate::raw::RawBuffer;
use crate::refcount::SharedCount;
use crate::relocate::{Relocation, TriviallyRelocatable};

enum Storage<'a, T> {
    /// Caller memory. `capacity` equals `slice.len()` until `clear()` zeroes it.
    Borrowed { slice: &'a [T], capacity: usize },
    /// Heap block shared by `count` holders.
    Owned { buf: RawBuffer<T>, count: SharedCount },
}

impl<T> Storage<'_, T> {
    fn empty() -> Self {
        Storage::Borrowed {
            slice: &[],
            capacity: 0,
        }
    }
}

/// A reference-counted dynamic array with copy-on-write semantics.
///
/// Clones share one buffer until one of them is written through
/// [`get_mut`](Self::get_mut), [`make_mut`](Self::make_mut),
/// [`push`](Self::push), [`pop`](Self::pop) or [`reserve`](Self::reserve);
/// the writer then clones the live elements into a buffer of its own.
/// A `CowVec` may also start out borrowing caller memory, which it reads in
/// place and copies on first write.
///
/// Allocation failures are returned as [`AllocError`] and leave the vector
/// unchanged. The holder count is not atomic: `CowVec` is neither `Send`
/// nor `Sync`.
///
/// # Example
///
/// ```
/// use cowvec::CowVec;
///
/// let mut a: CowVec<'_, i32> = CowVec::new();
/// a.reserve(4)?;
/// a.push(10)?;
/// a.push(20)?;
///
/// let mut b = a.clone();
/// assert!(a.is_shared());
///
/// *b.get_mut(0)? = 99;
/// assert_eq!(a, [10, 20]);
/// assert_eq!(b, [99, 20]);
/// # Ok::<(), cowvec::AllocError>(())
/// ```
pub struct CowVec<'a, T, R: Relocation = TriviallyRelocatable, A: BufferAlloc = Global> {
    storage: Storage<'a, T>,
    len: usize,
    growth: GrowthFactor,
    alloc: A,
    _relocation: PhantomData<R>,
}

impl<'a, T> CowVec<'a, T> {
    /// Create an empty vector. Does not allocate.
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    /// Create a vector that reads `slice` in place.
    ///
    /// The slice is never written; the first mutation copies it into an
    /// owned buffer.
    pub fn from_borrowed(slice: &'a [T]) -> Self {
        Self::from_borrowed_in(slice, Global)
    }

    /// Create an empty vector that owns a buffer of `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<'a, T, R: Relocation, A: BufferAlloc> CowVec<'a, T, R, A> {
    /// Create an empty vector that will allocate through `alloc`.
    pub fn new_in(alloc: A) -> Self {
        Self {
            storage: Storage::empty(),
            len: 0,
            growth: GrowthFactor::default(),
            alloc,
            _relocation: PhantomData,
        }
    }

    /// Create a vector that reads `slice` in place, allocating through
    /// `alloc` once it has to copy.
    pub fn from_borrowed_in(slice: &'a [T], alloc: A) -> Self {
        Self {
            storage: Storage::Borrowed {
                slice,
                capacity: slice.len(),
            },
            len: slice.len(),
            growth: GrowthFactor::default(),
            alloc,
            _relocation: PhantomData,
        }
    }

    /// Create an empty vector owning a buffer of `capacity` slots.
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Result<Self, AllocError> {
        let buf = RawBuffer::allocate(capacity, &alloc)?;
        let count = match SharedCount::allocate(&alloc) {
            Ok(count) => count,
            Err(err) => {
                // SAFETY: the block is fresh and holds no elements.
                unsafe { buf.destroy(0, &alloc) };
                return Err(err);
            }
        };
        Ok(Self {
            storage: Storage::Owned { buf, count },
            len: 0,
            growth: GrowthFactor::default(),
            alloc,
            _relocation: PhantomData,
        })
    }

    /// Replace the growth policy used when a full buffer needs one more slot.
    pub fn with_growth(mut self, growth: GrowthFactor) -> Self {
        self.growth = growth;
        self
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no live elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the current storage.
    ///
    /// For borrowed storage this is the length of the borrowed slice.
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Borrowed { capacity, .. } => *capacity,
            Storage::Owned { buf, .. } => buf.capacity(),
        }
    }

    /// The live elements. Never copies or allocates.
    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            Storage::Borrowed { slice, .. } => &slice[..self.len],
            // SAFETY: the first `len` slots of an owned block are initialised.
            Storage::Owned { buf, .. } => unsafe { buf.slice(self.len) },
        }
    }

    /// Pointer to the start of the current storage, for identity checks.
    ///
    /// After [`clear`](Self::clear) on borrowed storage this still points at
    /// the caller's memory.
    pub fn as_ptr(&self) -> *const T {
        match &self.storage {
            Storage::Borrowed { slice, .. } => slice.as_ptr(),
            Storage::Owned { buf, .. } => buf.as_ptr(),
        }
    }

    /// The element at `index`, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Whether the storage is caller memory.
    pub fn is_borrowed(&self) -> bool {
        matches!(self.storage, Storage::Borrowed { .. })
    }

    /// Whether the storage is owned and referenced by other vectors too.
    pub fn is_shared(&self) -> bool {
        self.ref_count().is_some_and(|n| n > 1)
    }

    /// Whether the storage is owned by this vector alone.
    pub fn is_exclusive(&self) -> bool {
        self.ref_count() == Some(1)
    }

    /// Number of vectors sharing the owned buffer, or `None` when borrowed.
    pub fn ref_count(&self) -> Option<usize> {
        match &self.storage {
            Storage::Borrowed { .. } => None,
            Storage::Owned { count, .. } => Some(count.get()),
        }
    }

    /// The growth policy.
    pub fn growth(&self) -> GrowthFactor {
        self.growth
    }

    /// The allocator.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Remove every element.
    ///
    /// Owned storage is released as if this vector were dropped, and the
    /// vector becomes empty. Borrowed storage keeps pointing at the caller's
    /// slice with its capacity reset to zero; the next push copies nothing
    /// and allocates a fresh buffer.
    pub fn clear(&mut self) {
        let old = mem::replace(&mut self.storage, Storage::empty());
        self.storage = match old {
            Storage::Borrowed { slice, .. } => Storage::Borrowed { slice, capacity: 0 },
            owned => {
                Self::release(owned, self.len, &self.alloc);
                Storage::empty()
            }
        };
        self.len = 0;
    }

    /// Exchange the contents of two vectors. Never allocates.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Move the contents out, leaving an empty vector with the same
    /// allocator and growth policy behind.
    pub fn take(&mut self) -> Self {
        let empty = Self::new_in(self.alloc.clone()).with_growth(self.growth);
        mem::replace(self, empty)
    }

    /// Drop one holder's reference to `storage`; the last holder drops the
    /// elements and frees the block and counter.
    fn release(storage: Storage<'a, T>, len: usize, alloc: &A) {
        let Storage::Owned { buf, count } = storage else {
            return;
        };
        if count.decrement() > 0 {
            return;
        }
        trace!("releasing buffer of {} slots holding {len} elements", buf.capacity());
        // SAFETY: the count reached zero, so no other vector references the
        // block or the counter; the first `len` slots are initialised.
        unsafe {
            buf.destroy(len, alloc);
            count.release(alloc);
        }
    }

    /// The owned block, which the caller has just made exclusive.
    fn exclusive_buf(&mut self) -> &mut RawBuffer<T> {
        match &mut self.storage {
            Storage::Owned { buf, count } => {
                debug_assert_eq!(count.get(), 1);
                buf
            }
            Storage::Borrowed { .. } => unreachable!("storage is owned after make_exclusive"),
        }
    }
}

impl<'a, T: Clone, R: Relocation, A: BufferAlloc> CowVec<'a, T, R, A> {
    /// Make sure this vector is the only holder of an owned buffer.
    ///
    /// Exclusive storage returns immediately. Shared or borrowed storage is
    /// cloned into a new buffer of the same capacity, and this vector's
    /// reference to the old storage is dropped. On error nothing changes.
    pub fn make_exclusive(&mut self) -> Result<(), AllocError> {
        if self.is_exclusive() {
            return Ok(());
        }
        trace!(
            "copy on write: cloning {} elements (ref_count {:?})",
            self.len,
            self.ref_count()
        );
        self.clone_into_new(self.capacity())
    }

    /// The live elements, writable.
    ///
    /// Calls [`make_exclusive`](Self::make_exclusive) first.
    pub fn make_mut(&mut self) -> Result<&mut [T], AllocError> {
        self.make_exclusive()?;
        let len = self.len;
        // SAFETY: exclusive block with `len` initialised slots, borrowed
        // mutably through `self`.
        Ok(unsafe { self.exclusive_buf().slice_mut(len) })
    }

    /// The element at `index`, writable.
    ///
    /// Calls [`make_exclusive`](Self::make_exclusive) first.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, AllocError> {
        assert!(
            index < self.len,
            "index {index} out of range for CowVec of length {}",
            self.len
        );
        Ok(&mut self.make_mut()?[index])
    }

    /// Grow the buffer to exactly `capacity` slots if it is smaller.
    ///
    /// A shared or borrowed buffer is cloned into the new block, so on
    /// success this vector always owns its storage exclusively unless
    /// `capacity` was already sufficient.
    pub fn reserve(&mut self, capacity: usize) -> Result<(), AllocError> {
        if capacity <= self.capacity() {
            return Ok(());
        }
        self.reallocate(capacity)
    }

    /// Append `value`, returning a reference to it in its new slot.
    ///
    /// A full buffer grows by the [`GrowthFactor`]; otherwise the buffer is
    /// made exclusive first. On error `value` is dropped and the vector is
    /// unchanged.
    pub fn push(&mut self, value: T) -> Result<&mut T, AllocError> {
        let len = self.len;
        if len == self.capacity() {
            let target = self
                .growth
                .next_capacity(len)
                .ok_or(AllocError::CapacityOverflow {
                    requested: len.saturating_add(1),
                })?;
            self.reallocate(target)?;
        } else {
            self.make_exclusive()?;
        }

        let buf = self.exclusive_buf();
        debug_assert!(len < buf.capacity());
        // SAFETY: `len < capacity`, the slot is uninitialised and the block
        // is exclusive.
        let slot = unsafe {
            let slot = buf.as_ptr().add(len);
            slot.write(value);
            &mut *slot
        };
        self.len = len + 1;
        Ok(slot)
    }

    /// Remove and return the last element.
    ///
    /// Shared or borrowed storage is made exclusive first so other holders
    /// keep their elements.
    ///
    /// # Panics
    ///
    /// Panics if the vector is empty.
    pub fn pop(&mut self) -> Result<T, AllocError> {
        assert!(self.len > 0, "pop from an empty CowVec");
        self.make_exclusive()?;
        let last = self.len - 1;
        // SAFETY: slot `last` is initialised and the block is exclusive;
        // shrinking `len` below stops it from being read or dropped again.
        let value = unsafe { self.exclusive_buf().as_ptr().add(last).read() };
        self.len = last;
        Ok(value)
    }

    /// Detach from borrowed storage, copying it if necessary.
    pub fn into_owned<'b>(mut self) -> Result<CowVec<'b, T, R, A>, AllocError>
    where
        T: 'b,
    {
        if self.is_borrowed() {
            self.make_exclusive()?;
        }
        let storage = match mem::replace(&mut self.storage, Storage::empty()) {
            Storage::Owned { buf, count } => Storage::Owned { buf, count },
            Storage::Borrowed { .. } => unreachable!("borrowed storage was copied above"),
        };
        Ok(CowVec {
            storage,
            len: mem::take(&mut self.len),
            growth: self.growth,
            alloc: self.alloc.clone(),
            _relocation: PhantomData,
        })
    }

    /// Move to a block of `new_capacity` slots.
    ///
    /// Exclusive storage grows through the relocation policy. Shared and
    /// borrowed storage take the copy-on-write path into the larger block.
    fn reallocate(&mut self, new_capacity: usize) -> Result<(), AllocError> {
        let len = self.len;
        let result = if self.is_exclusive() {
            match &mut self.storage {
                Storage::Owned { buf, .. } => {
                    trace!(
                        "growing exclusive buffer {} -> {new_capacity} slots (in place: {})",
                        buf.capacity(),
                        R::TRIVIALLY_RELOCATABLE
                    );
                    // SAFETY: the block is exclusive and holds `len` elements.
                    unsafe { buf.grow(len, new_capacity, &self.alloc, R::TRIVIALLY_RELOCATABLE) }
                }
                Storage::Borrowed { .. } => unreachable!("exclusive storage is owned"),
            }
        } else {
            trace!(
                "growing {} buffer by copy into {new_capacity} slots",
                if self.is_borrowed() { "borrowed" } else { "shared" }
            );
            self.clone_into_new(new_capacity)
        };
        if let Err(err) = &result {
            debug!("reallocation to {new_capacity} slots failed: {err}");
        }
        result
    }

    /// Clone the live elements into a new exclusive block of `capacity`
    /// slots and drop this vector's hold on the current storage.
    fn clone_into_new(&mut self, capacity: usize) -> Result<(), AllocError> {
        let buf = RawBuffer::clone_from_slice(self.as_slice(), capacity, &self.alloc)?;
        let count = match SharedCount::allocate(&self.alloc) {
            Ok(count) => count,
            Err(err) => {
                // SAFETY: the block is fresh and holds `len` clones.
                unsafe { buf.destroy(self.len, &self.alloc) };
                return Err(err);
            }
        };
        let old = mem::replace(&mut self.storage, Storage::Owned { buf, count });
        Self::release(old, self.len, &self.alloc);
        Ok(())
    }
}

impl<T, R: Relocation, A: BufferAlloc> Drop for CowVec<'_, T, R, A> {
    fn drop(&mut self) {
        let storage = mem::replace(&mut self.storage, Storage::empty());
        Self::release(storage, self.len, &self.alloc);
    }
}

impl<T, R: Relocation, A: BufferAlloc> Clone for CowVec<'_, T, R, A> {
    /// Share the storage. Owned buffers gain one holder; borrowed storage is
    /// viewed again. Never clones elements.
    fn clone(&self) -> Self {
        let storage = match &self.storage {
            Storage::Borrowed { slice, capacity } => Storage::Borrowed {
                slice: *slice,
                capacity: *capacity,
            },
            Storage::Owned { buf, count } => {
                count.increment();
                Storage::Owned {
                    buf: buf.alias(),
                    count: *count,
                }
            }
        };
        Self {
            storage,
            len: self.len,
            growth: self.growth,
            alloc: self.alloc.clone(),
            _relocation: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        let mut incoming = source.clone();
        self.swap(&mut incoming);
    }
}

impl<T, R: Relocation, A: BufferAlloc + Default> Default for CowVec<'_, T, R, A> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<'a, T, R: Relocation, A: BufferAlloc + Default> From<&'a [T]> for CowVec<'a, T, R, A> {
    fn from(slice: &'a [T]) -> Self {
        Self::from_borrowed_in(slice, A::default())
    }
}

impl<'a, T, const N: usize, R: Relocation, A: BufferAlloc + Default> From<&'a [T; N]>
    for CowVec<'a, T, R, A>
{
    fn from(array: &'a [T; N]) -> Self {
        Self::from_borrowed_in(array.as_slice(), A::default())
    }
}

impl<T, R: Relocation, A: BufferAlloc> Index<usize> for CowVec<'_, T, R, A> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        assert!(
            index < self.len,
            "index {index} out of range for CowVec of length {}",
            self.len
        );
        &self.as_slice()[index]
    }
}

impl<T, R: Relocation, A: BufferAlloc> AsRef<[T]> for CowVec<'_, T, R, A> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: PartialEq, R1, A1, R2, A2> PartialEq<CowVec<'_, T, R2, A2>> for CowVec<'_, T, R1, A1>
where
    R1: Relocation,
    A1: BufferAlloc,
    R2: Relocation,
    A2: BufferAlloc,
{
    fn eq(&self, other: &CowVec<'_, T, R2, A2>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, R: Relocation, A: BufferAlloc> Eq for CowVec<'_, T, R, A> {}

impl<T: PartialEq, R: Relocation, A: BufferAlloc> PartialEq<[T]> for CowVec<'_, T, R, A> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: PartialEq, const N: usize, R: Relocation, A: BufferAlloc> PartialEq<[T; N]>
    for CowVec<'_, T, R, A>
{
    fn eq(&self, other: &[T; N]) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: fmt::Debug, R: Relocation, A: BufferAlloc> fmt::Debug for CowVec<'_, T, R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Renders the live elements as `[e0, e1, ..., en]`.
impl<T: fmt::Display, R: Relocation, A: BufferAlloc> fmt::Display for CowVec<'_, T, R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.as_slice().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{item}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relocate::ElementWise;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Counts drops through a shared cell.
    #[derive(Clone, Debug)]
    struct Noisy {
        value: i32,
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Noisy {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    fn filled(values: &[i32]) -> CowVec<'static, i32> {
        let mut v = CowVec::new();
        for &x in values {
            v.push(x).unwrap();
        }
        v
    }

    #[test]
    fn new_is_empty_and_borrowed() {
        let v: CowVec<'_, u8> = CowVec::new();
        assert_eq!(v.len(), 0);
        assert_eq!(v.capacity(), 0);
        assert!(v.is_empty());
        assert!(v.is_borrowed());
        assert_eq!(v.ref_count(), None);
    }

    #[test]
    fn push_into_empty_grows_to_one() {
        let mut v = CowVec::new();
        assert_eq!(*v.push(5).unwrap(), 5);
        assert_eq!(v.capacity(), 1);
        assert!(v.is_exclusive());
    }

    #[test]
    fn growth_follows_default_factor() {
        let mut v = CowVec::new();
        let mut caps = Vec::new();
        for i in 0..12 {
            v.push(i).unwrap();
            caps.push(v.capacity());
        }
        assert_eq!(caps, vec![1, 2, 4, 4, 7, 7, 7, 11, 11, 11, 11, 17]);
    }

    #[test]
    fn custom_growth_factor() {
        let mut v = CowVec::new().with_growth(GrowthFactor::new(2, 1).unwrap());
        for i in 0..5 {
            v.push(i).unwrap();
        }
        assert_eq!(v.capacity(), 8);
    }

    #[test]
    fn push_returns_reference_to_new_slot() {
        let mut v = filled(&[1, 2]);
        let slot = v.push(3).unwrap();
        *slot += 10;
        assert_eq!(v, [1, 2, 13]);
    }

    #[test]
    fn clone_shares_until_write() {
        let a = filled(&[1, 2, 3]);
        let mut b = a.clone();
        assert_eq!(a.ref_count(), Some(2));
        assert_eq!(a.as_ptr(), b.as_ptr());

        *b.get_mut(1).unwrap() = 20;
        assert_ne!(a.as_ptr(), b.as_ptr());
        assert_eq!(a, [1, 2, 3]);
        assert_eq!(b, [1, 20, 3]);
        assert!(a.is_exclusive());
        assert!(b.is_exclusive());
    }

    #[test]
    fn clone_keeps_capacity_on_copy_on_write() {
        let mut a = CowVec::with_capacity(9).unwrap();
        a.push(1).unwrap();
        let mut b = a.clone();
        b.make_exclusive().unwrap();
        assert_eq!(b.capacity(), 9);
    }

    #[test]
    fn exclusive_write_does_not_copy() {
        let mut v = filled(&[1, 2]);
        let before = v.as_ptr();
        v.make_mut().unwrap()[0] = 7;
        assert_eq!(v.as_ptr(), before);
    }

    #[test]
    fn push_into_shared_buffer_with_room_copies() {
        let mut a = CowVec::with_capacity(4).unwrap();
        a.push(1).unwrap();
        let mut b = a.clone();
        b.push(2).unwrap();
        assert_eq!(a, [1]);
        assert_eq!(b, [1, 2]);
        assert_eq!(b.capacity(), 4);
        assert!(!a.is_shared());
    }

    #[test]
    fn borrowed_reads_in_place() {
        let data = [1, 2, 3];
        let v = CowVec::from_borrowed(&data);
        assert!(v.is_borrowed());
        assert_eq!(v.len(), 3);
        assert_eq!(v.capacity(), 3);
        assert_eq!(v.as_ptr(), data.as_ptr());
        assert_eq!(v[2], 3);
    }

    #[test]
    fn borrowed_copies_on_write() {
        let data = vec![String::from("x"), String::from("y")];
        let mut v = CowVec::from_borrowed(&data);
        v.get_mut(0).unwrap().push('!');
        assert!(v.is_exclusive());
        assert_eq!(v, [String::from("x!"), String::from("y")]);
        assert_eq!(data, vec![String::from("x"), String::from("y")]);
    }

    #[test]
    fn borrowed_clone_is_a_second_view() {
        let data = [4, 5];
        let v: CowVec<'_, i32> = CowVec::from(&data);
        let w = v.clone();
        assert!(w.is_borrowed());
        assert_eq!(w.as_ptr(), data.as_ptr());
    }

    #[test]
    fn pop_on_shared_leaves_other_holder_intact() {
        let a = filled(&[10, 20]);
        let mut b = a.clone();
        assert_eq!(b.pop().unwrap(), 20);
        assert_eq!(b, [10]);
        assert_eq!(a, [10, 20]);
    }

    #[test]
    fn pop_from_borrowed_copies() {
        let data = [1, 2];
        let mut v = CowVec::from_borrowed(&data);
        assert_eq!(v.pop().unwrap(), 2);
        assert!(!v.is_borrowed());
        assert_eq!(data, [1, 2]);
    }

    #[test]
    #[should_panic(expected = "pop from an empty CowVec")]
    fn pop_empty_panics() {
        let mut v: CowVec<'_, i32> = CowVec::new();
        let _ = v.pop();
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn index_out_of_range_panics() {
        let v = filled(&[1]);
        let _ = v[1];
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn get_mut_out_of_range_panics() {
        let mut v = filled(&[1]);
        let _ = v.get_mut(3);
    }

    #[test]
    fn reserve_is_exact_and_noop_when_sufficient() {
        let mut v = filled(&[1]);
        v.reserve(10).unwrap();
        assert_eq!(v.capacity(), 10);
        v.reserve(3).unwrap();
        assert_eq!(v.capacity(), 10);
    }

    #[test]
    fn reserve_on_shared_detaches() {
        let a = filled(&[1, 2]);
        let mut b = a.clone();
        b.reserve(16).unwrap();
        assert!(b.is_exclusive());
        assert!(a.is_exclusive());
        assert_eq!(b, [1, 2]);
        assert_eq!(a.capacity(), 2);
    }

    #[test]
    fn element_wise_relocation_preserves_values() {
        let mut v: CowVec<'_, String, ElementWise> = CowVec::new_in(Global);
        for i in 0..20 {
            v.push(i.to_string()).unwrap();
        }
        assert_eq!(v.len(), 20);
        assert_eq!(v[19], "19");
    }

    #[test]
    fn clear_owned_releases_and_resets() {
        let drops = Rc::new(Cell::new(0));
        let mut v = CowVec::new();
        for value in 0..3 {
            v.push(Noisy {
                value,
                drops: Rc::clone(&drops),
            })
            .unwrap();
        }
        v.clear();
        assert_eq!(drops.get(), 3);
        assert_eq!(v.len(), 0);
        assert_eq!(v.capacity(), 0);
        assert!(v.is_borrowed());
    }

    #[test]
    fn clear_shared_keeps_other_holder() {
        let a = filled(&[1, 2]);
        let mut b = a.clone();
        b.clear();
        assert_eq!(a, [1, 2]);
        assert!(a.is_exclusive());
        assert!(b.is_empty());
    }

    #[test]
    fn clear_borrowed_keeps_handle_with_zero_capacity() {
        let data = [1, 2, 3];
        let mut v = CowVec::from_borrowed(&data);
        v.clear();
        assert_eq!(v.len(), 0);
        assert_eq!(v.capacity(), 0);
        assert!(v.is_borrowed());
        assert_eq!(v.as_ptr(), data.as_ptr());

        v.push(9).unwrap();
        assert_eq!(v, [9]);
        assert_eq!(v.capacity(), 1);
        assert_eq!(data, [1, 2, 3]);
    }

    #[test]
    fn drop_order_is_insertion_order() {
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        #[derive(Clone)]
        struct Ordered(i32, Rc<std::cell::RefCell<Vec<i32>>>);
        impl Drop for Ordered {
            fn drop(&mut self) {
                self.1.borrow_mut().push(self.0);
            }
        }

        let mut v = CowVec::new();
        for i in 0..4 {
            v.push(Ordered(i, Rc::clone(&order))).unwrap();
        }
        drop(v);
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn last_holder_drops_elements() {
        let drops = Rc::new(Cell::new(0));
        let mut a = CowVec::new();
        a.push(Noisy {
            value: 1,
            drops: Rc::clone(&drops),
        })
        .unwrap();
        let b = a.clone();
        let c = b.clone();
        drop(a);
        drop(c);
        assert_eq!(drops.get(), 0);
        assert_eq!(b[0].value, 1);
        drop(b);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn take_leaves_fresh_vector() {
        let mut a = filled(&[1, 2]);
        let b = a.take();
        assert_eq!(b, [1, 2]);
        assert!(a.is_empty());
        assert!(a.is_borrowed());
        a.push(3).unwrap();
        assert_eq!(a, [3]);
    }

    #[test]
    fn swap_exchanges_everything() {
        let data = [7];
        let mut a = CowVec::from_borrowed(&data);
        let mut b = filled(&[1, 2, 3]);
        a.swap(&mut b);
        assert_eq!(a, [1, 2, 3]);
        assert!(b.is_borrowed());
        assert_eq!(b, [7]);
    }

    #[test]
    fn clone_from_shares_source() {
        let a = filled(&[1, 2]);
        let mut b = filled(&[9]);
        b.clone_from(&a);
        assert_eq!(b, [1, 2]);
        assert_eq!(a.ref_count(), Some(2));
    }

    #[test]
    fn into_owned_detaches_from_borrow() {
        let owned = {
            let data = vec![1, 2, 3];
            let v = CowVec::from_borrowed(&data);
            v.into_owned().unwrap()
        };
        assert_eq!(owned, [1, 2, 3]);
        assert!(owned.is_exclusive());
    }

    #[test]
    fn zero_sized_elements() {
        let mut v = CowVec::new();
        for _ in 0..10 {
            v.push(()).unwrap();
        }
        let w = v.clone();
        v.pop().unwrap();
        assert_eq!(v.len(), 9);
        assert_eq!(w.len(), 10);
    }

    #[test]
    fn display_and_debug() {
        let empty: CowVec<'_, i32> = CowVec::new();
        assert_eq!(empty.to_string(), "[]");
        let v = filled(&[1, 2, 3]);
        assert_eq!(v.to_string(), "[1, 2, 3]");
        assert_eq!(format!("{v:?}"), "[1, 2, 3]");
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Push(i32),
            Pop,
            Set(usize, i32),
            Fork,
            Reserve(usize),
            Clear,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => any::<i32>().prop_map(Op::Push),
                2 => Just(Op::Pop),
                2 => (any::<usize>(), any::<i32>()).prop_map(|(i, x)| Op::Set(i, x)),
                1 => Just(Op::Fork),
                1 => (0usize..64).prop_map(Op::Reserve),
                1 => Just(Op::Clear),
            ]
        }

        proptest! {
            #[test]
            fn behaves_like_vec_with_forks(ops in proptest::collection::vec(op(), 1..80)) {
                let mut v: CowVec<'_, i32> = CowVec::new();
                let mut model: Vec<i32> = Vec::new();
                let mut forks: Vec<(CowVec<'_, i32>, Vec<i32>)> = Vec::new();

                for op in ops {
                    match op {
                        Op::Push(x) => {
                            v.push(x).unwrap();
                            model.push(x);
                        }
                        Op::Pop => {
                            if !model.is_empty() {
                                prop_assert_eq!(v.pop().unwrap(), model.pop().unwrap());
                            }
                        }
                        Op::Set(i, x) => {
                            if !model.is_empty() {
                                let i = i % model.len();
                                *v.get_mut(i).unwrap() = x;
                                model[i] = x;
                            }
                        }
                        Op::Fork => forks.push((v.clone(), model.clone())),
                        Op::Reserve(n) => {
                            v.reserve(n).unwrap();
                            prop_assert!(v.capacity() >= n);
                        }
                        Op::Clear => {
                            v.clear();
                            model.clear();
                        }
                    }
                    prop_assert!(v.len() <= v.capacity());
                    prop_assert_eq!(v.as_slice(), model.as_slice());
                }

                for (fork, snapshot) in &forks {
                    prop_assert_eq!(fork.as_slice(), snapshot.as_slice());
                }
            }

            #[test]
            fn capacity_never_shrinks_while_pushing(
                values in proptest::collection::vec(any::<u16>(), 0..200),
            ) {
                let mut v = CowVec::new();
                let mut last = v.capacity();
                for x in values {
                    v.push(x).unwrap();
                    prop_assert!(v.capacity() >= last);
                    prop_assert!(v.len() <= v.capacity());
                    last = v.capacity();
                }
            }
        }
    }
}
