//! plot-feed: caching and downsampling pipeline for time-series charts.
//!
//! - [`cache`]: bounded LRU store, cache manager with tags and
//!   stale-while-revalidate, and the shared per-period fetch cache
//! - [`chart`]: chart configuration and the per-chart coordinator
//! - [`data`]: raw period records, coercion and a Polars-backed provider
//! - [`sampling`]: the sampling engine contract and built-in LTTB/nth-point
//! - [`state`]: sampling settings and the loading registry

pub mod cache;
pub mod chart;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod perf;
pub mod sampling;
pub mod state;

pub use cache::{CacheConfig, CacheManager, CacheStrategy, LruStore, SharedFetchCache};
pub use chart::{
    ChartConfig, ChartContext, ChartCoordinator, ChartPoint, ChartSnapshot, ChartStatus,
};
pub use config::PipelineConfig;
pub use data::{FrameProvider, PeriodDataProvider, RawRecord, RawValue};
pub use error::{FetchError, PipelineError, Result, SamplingError};
pub use sampling::{Downsampler, SamplingEngine, SamplingMethod};
pub use state::{LoadingRegistry, SamplingSettings, SettingsProvider, SharedSettings};
