//! Copy-on-write, reference-counted dynamic arrays.
//!
//! A [`CowVec`] behaves like an independent `Vec` after every clone, but
//! clones share one buffer until one of them writes. The writer copies the
//! live elements into a buffer of its own first, so never-mutated copies
//! cost one counter increment. This crate contains `unsafe` code, confined
//! to `allocator`, `raw`, `refcount` and `vec`.
//!
//! # Architecture
//!
//! ```text
//! CowVec<'a, T, R, A>
//! ├── Storage::Borrowed { &'a [T], capacity }   caller memory, copied on first write
//! └── Storage::Owned
//!     ├── RawBuffer<T>   data block (allocated through A: BufferAlloc)
//!     └── SharedCount    separate holder-count allocation
//! ```
//!
//! # Ownership states
//!
//! - **Borrowed:** reads go straight to the caller's slice; any write clones
//!   it into an owned buffer.
//! - **Shared:** owned, holder count above one; any write clones.
//! - **Exclusive:** owned, holder count exactly one; writes happen in place.
//!
//! # Growth
//!
//! A full buffer grows by a rational [`GrowthFactor`] (default ≈ 1.5342).
//! Exclusive buffers grow according to the [`Relocation`] policy, either
//! through the allocator's `reallocate` or by moving into a fresh block.
//! Shared and borrowed buffers take the copy-on-write path straight into the
//! larger block.
//!
//! # Errors
//!
//! Allocation never panics or aborts: every operation that allocates
//! returns `Result<_, AllocError>` and leaves the vector unchanged on error.
//! Out-of-range indexing and popping an empty vector are programming errors
//! and panic.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod error;
mod raw;
mod refcount;
pub mod relocate;
pub mod vec;

// Public re-exports for the primary API surface.
pub use allocator::{BufferAlloc, Global};
pub use config::GrowthFactor;
pub use error::{AllocError, ConfigError};
pub use relocate::{ElementWise, Relocation, TriviallyRelocatable};
pub use vec::CowVec;
