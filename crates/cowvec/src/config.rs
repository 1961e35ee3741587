//! Capacity growth policy.

use crate::error::ConfigError;

/// Rational growth factor applied when a full buffer needs one more slot.
///
/// The next capacity is `ceil(capacity * num / den)`, computed in integer
/// arithmetic, and never less than `capacity + 1`. Validated at
/// construction; immutable afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GrowthFactor {
    num: u32,
    den: u32,
}

impl GrowthFactor {
    /// Numerator of the default factor.
    pub const DEFAULT_NUM: u32 = 1_645_915;

    /// Denominator of the default factor.
    ///
    /// `DEFAULT_NUM / DEFAULT_DEN ≈ 1.5341577449`, the positive root of
    /// `1 + x + x² + x³ = x⁵`: the four previously released blocks together
    /// cover the next request.
    pub const DEFAULT_DEN: u32 = 1_072_846;

    /// The default factor (`DEFAULT_NUM / DEFAULT_DEN`).
    pub const DEFAULT: Self = Self {
        num: Self::DEFAULT_NUM,
        den: Self::DEFAULT_DEN,
    };

    /// Create a growth factor of `num / den`.
    ///
    /// Returns [`ConfigError::InvalidGrowthFactor`] unless `num > den > 0`;
    /// a factor of one or less would never grow a full buffer.
    pub fn new(num: u32, den: u32) -> Result<Self, ConfigError> {
        if den == 0 || num <= den {
            return Err(ConfigError::InvalidGrowthFactor { num, den });
        }
        Ok(Self { num, den })
    }

    /// Numerator.
    pub fn num(&self) -> u32 {
        self.num
    }

    /// Denominator.
    pub fn den(&self) -> u32 {
        self.den
    }

    /// The factor as a float, for diagnostics.
    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Capacity to grow to when a buffer of `capacity` slots is full.
    ///
    /// An empty buffer grows to one slot. Returns `None` if the result does
    /// not fit in `usize`.
    pub fn next_capacity(&self, capacity: usize) -> Option<usize> {
        if capacity == 0 {
            return Some(1);
        }
        let num = u128::from(self.num);
        let den = u128::from(self.den);
        let scaled = (capacity as u128).checked_mul(num)?;
        let grown = scaled.div_ceil(den);
        let grown = usize::try_from(grown).ok()?;
        Some(grown.max(capacity.checked_add(1)?))
    }
}

impl Default for GrowthFactor {
    fn default() -> Self {
        Self::DEFAULT
    }
}
