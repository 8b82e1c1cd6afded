//! Static limits and defaults.

/// The smallest variable clock rate that takes part in arbitration.
pub const MIN_VARIABLE_RATE: i32 = 1;

/// The smallest fixed clock rate that takes part in arbitration.
///
/// Fixed steps longer than 100ms are not honored.
pub const MIN_FIXED_RATE: i32 = 10;

/// The variable clock rate used when no request asks for one.
pub const DEFAULT_FALLBACK_VARIABLE_RATE: i32 = 60;

/// The fixed clock rate used when no request asks for one.
pub const DEFAULT_FALLBACK_FIXED_RATE: i32 = 50;

/// The number of variable clock samples averaged into the current rate.
pub const DEFAULT_SAMPLE_WINDOW: usize = 10;

/// The smallest legal sample window.
pub const MIN_SAMPLE_WINDOW: usize = 1;

/// The largest sample window a settings UI should offer. Not enforced.
pub const RECOMMENDED_MAX_SAMPLE_WINDOW: usize = 60;

/// The maximum number of distinct rate notifications a single operation can
/// produce, one per [`RateFields`](crate::RateFields) bit.
pub(crate) const MAX_CHANGES_PER_PASS: usize = 4;
