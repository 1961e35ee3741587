//! Error types for buffer allocation and configuration.

use std::error::Error;
use std::fmt;

/// Errors from operations that allocate.
///
/// Every fallible operation on [`CowVec`](crate::CowVec) returns this on
/// failure and leaves the container exactly as it was before the call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The allocator could not provide a block of the requested size.
    AllocFailed {
        /// Size of the rejected request in bytes.
        bytes: usize,
    },
    /// The byte size of the requested capacity does not fit in `isize`.
    CapacityOverflow {
        /// Requested capacity in elements.
        requested: usize,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocFailed { bytes } => {
                write!(f, "allocation failed: requested {bytes} bytes")
            }
            Self::CapacityOverflow { requested } => {
                write!(f, "capacity overflow: {requested} elements")
            }
        }
    }
}

impl Error for AllocError {}

/// Errors from constructing a configuration value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A growth factor must satisfy `num > den > 0`.
    InvalidGrowthFactor {
        /// Rejected numerator.
        num: u32,
        /// Rejected denominator.
        den: u32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGrowthFactor { num, den } => {
                write!(f, "invalid growth factor {num}/{den}: must be greater than 1")
            }
        }
    }
}

impl Error for ConfigError {}
