//! Relocation policies for growing an exclusively owned buffer.
//!
//! A Rust move is always a bitwise copy that never runs the source's
//! destructor, so every element type may be relocated by `memcpy`. The
//! policy therefore only selects the mechanism: hand the block to the
//! allocator's `reallocate` (which may grow it in place), or always allocate
//! a fresh block and move the elements across one by one.

/// Selects how an exclusively owned buffer is grown.
///
/// Shared and borrowed buffers ignore the policy: growing them always clones
/// into a fresh block.
pub trait Relocation {
    /// Whether growth may go through [`BufferAlloc::reallocate`](crate::BufferAlloc::reallocate).
    const TRIVIALLY_RELOCATABLE: bool;
}

/// Grow through the allocator's `reallocate`, in place when possible.
#[derive(Clone, Copy, Debug)]
pub enum TriviallyRelocatable {}

impl Relocation for TriviallyRelocatable {
    const TRIVIALLY_RELOCATABLE: bool = true;
}

/// Allocate a new block, move each element into it, then free the old block.
///
/// The old block stays valid until every element has been moved, which keeps
/// allocators that cannot resize from ever seeing a `reallocate` call.
#[derive(Clone, Copy, Debug)]
pub enum ElementWise {}

impl Relocation for ElementWise {
    const TRIVIALLY_RELOCATABLE: bool = false;
}
