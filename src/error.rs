//! Unified error type for urbanite.
//!
//! The state machines themselves never fail; errors only arise when the
//! controller is assembled from an invalid configuration.
//! All variants carry fixed-size data (no `alloc`).

/// Which press threshold was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Threshold {
    OnOff,
    Change,
    Pause,
}

/// Top-level error type used across the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A press threshold is zero, so every press would match it.
    InvalidThreshold(Threshold),

    /// Debounce interval is zero.
    InvalidDebounce,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidThreshold(which) => write!(f, "{which:?} press threshold must be non-zero"),
            Error::InvalidDebounce => f.write_str("debounce interval must be non-zero"),
        }
    }
}
