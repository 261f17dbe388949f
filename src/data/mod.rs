pub mod coerce;
pub mod provider;
pub mod source;

// Re-export key types for convenience
pub use coerce::{coerce_number, coerce_timestamp};
pub use provider::{PeriodDataProvider, PeriodRows, RawRecord, RawValue};
pub use source::FrameProvider;
