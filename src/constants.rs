//! Pipeline-wide constants and default values
//!
//! This module centralizes all magic numbers and default values used throughout
//! the crate, making them easier to maintain and configure.

/// Cache Manager defaults
pub mod cache {
    /// Default maximum number of entries
    pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

    /// Default memory budget (50 MB)
    pub const DEFAULT_MAX_MEMORY: usize = 50 * 1024 * 1024;

    /// Default max-age before an entry is stale (5 minutes)
    pub const DEFAULT_MAX_AGE_MS: u64 = 5 * 60 * 1000;

    /// Default window after max-age during which stale data may be served (1 minute)
    pub const DEFAULT_STALE_WINDOW_MS: u64 = 60 * 1000;

    /// Default interval between expiry sweeps (1 minute)
    pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60 * 1000;
}

/// Size estimation constants (bytes)
pub mod size {
    /// Estimate for values that cannot be measured
    pub const FALLBACK_ESTIMATE: usize = 1024;

    /// Estimate for a boolean
    pub const BOOL_SIZE: usize = 4;

    /// Estimate for a number
    pub const NUMBER_SIZE: usize = 8;

    /// Bytes per character for strings and serialized composites (UTF-16 sized)
    pub const BYTES_PER_CHAR: usize = 2;
}

/// Shared Fetch Cache defaults
pub mod fetch {
    /// Lifetime of a cached fetch (5 minutes)
    pub const DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;
}

/// Chart coordinator defaults
pub mod chart {
    /// Quiet period before a configuration change triggers a reload
    pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

    /// Separator between Y-parameter entries in a fetch signature
    pub const SIGNATURE_SEPARATOR: &str = "|";
}

/// Sampling defaults
pub mod sampling {
    /// Point count above which sampling kicks in
    pub const DEFAULT_TARGET_POINTS: usize = 5000;

    /// Smallest target LTTB can honour (first, last, and one bucket)
    pub const LTTB_MIN_TARGET: usize = 3;
}

/// Date/time parsing constants
pub mod datetime {
    /// Numbers at or above this are epoch milliseconds rather than seconds (2001-09-09 in ms)
    pub const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

    /// Minimum string length for compact YYYYMMDD HHMMSS timestamps
    pub const MIN_TIMESTAMP_LENGTH: usize = 15;

    /// YYYYMMDD format length
    pub const DATE_FORMAT_LENGTH: usize = 8;

    /// HHMMSS format length
    pub const TIME_FORMAT_LENGTH: usize = 6;
}
