//! Test utilities for cowvec development.
//!
//! Provides [`BudgetAlloc`], a [`BufferAlloc`] that can be told to fail and
//! that counts live blocks, and [`Tally`] / [`Tracked`], an element wrapper
//! that counts its clones and drops. Together they let tests observe when a
//! buffer is copied, when elements are destroyed, and when memory is
//! returned.

#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::alloc::Layout;
use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use cowvec::{BufferAlloc, Global};

#[derive(Debug, Default)]
struct BudgetState {
    /// Allocations still permitted; `None` means unlimited.
    remaining: Cell<Option<usize>>,
    live: Cell<usize>,
    allocations: Cell<usize>,
    reallocations: Cell<usize>,
    failures: Cell<usize>,
}

/// Allocator with an optional budget of successful requests.
///
/// Clones share one budget and one set of counters, so every vector that
/// shares a buffer reports into the same place. Each `allocate` or
/// `reallocate` consumes one unit of budget; once the budget reaches zero
/// every request fails until [`refill`](Self::refill) is called.
/// Memory comes from [`Global`].
#[derive(Clone, Debug, Default)]
pub struct BudgetAlloc {
    state: Rc<BudgetState>,
}

impl BudgetAlloc {
    /// An allocator that never fails on its own.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// An allocator that serves `budget` requests, then fails.
    pub fn with_budget(budget: usize) -> Self {
        let alloc = Self::default();
        alloc.state.remaining.set(Some(budget));
        alloc
    }

    /// Fail every request from now on.
    pub fn exhaust(&self) {
        self.state.remaining.set(Some(0));
    }

    /// Remove the budget limit.
    pub fn refill(&self) {
        self.state.remaining.set(None);
    }

    /// Blocks handed out and not yet freed.
    pub fn live_blocks(&self) -> usize {
        self.state.live.get()
    }

    /// Successful `allocate` calls.
    pub fn allocations(&self) -> usize {
        self.state.allocations.get()
    }

    /// Successful `reallocate` calls.
    pub fn reallocations(&self) -> usize {
        self.state.reallocations.get()
    }

    /// Requests refused because the budget was spent.
    pub fn failures(&self) -> usize {
        self.state.failures.get()
    }

    fn try_spend(&self) -> bool {
        match self.state.remaining.get() {
            None => true,
            Some(0) => {
                self.state.failures.set(self.state.failures.get() + 1);
                false
            }
            Some(n) => {
                self.state.remaining.set(Some(n - 1));
                true
            }
        }
    }
}

impl BufferAlloc for BudgetAlloc {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if !self.try_spend() {
            return None;
        }
        let ptr = Global.allocate(layout)?;
        self.state.live.set(self.state.live.get() + 1);
        self.state.allocations.set(self.state.allocations.get() + 1);
        Some(ptr)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        if !self.try_spend() {
            return None;
        }
        // SAFETY: forwarded from the caller's contract; blocks come from `Global`.
        let ptr = unsafe { Global.reallocate(ptr, old, new_size) }?;
        self.state
            .reallocations
            .set(self.state.reallocations.get() + 1);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller's contract; blocks come from `Global`.
        unsafe { Global.deallocate(ptr, layout) };
        let live = self.state.live.get();
        assert!(live > 0, "deallocate called with no live blocks");
        self.state.live.set(live - 1);
    }
}

/// Shared clone and drop counters for [`Tracked`] values.
#[derive(Clone, Debug, Default)]
pub struct Tally {
    clones: Rc<Cell<usize>>,
    drops: Rc<Cell<usize>>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `value` so its clones and drops are counted here.
    pub fn track<T>(&self, value: T) -> Tracked<T> {
        Tracked {
            value,
            tally: self.clone(),
        }
    }

    pub fn clones(&self) -> usize {
        self.clones.get()
    }

    pub fn drops(&self) -> usize {
        self.drops.get()
    }
}

/// A value that reports its clones and drops to a [`Tally`].
pub struct Tracked<T> {
    value: T,
    tally: Tally,
}

impl<T> Tracked<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Clone> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        self.tally.clones.set(self.tally.clones.get() + 1);
        Self {
            value: self.value.clone(),
            tally: self.tally.clone(),
        }
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.tally.drops.set(self.tally.drops.get() + 1);
    }
}

impl<T: PartialEq> PartialEq for Tracked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}
