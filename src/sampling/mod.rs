//! Series downsampling
//!
//! The coordinator hands each oversized series to a [`SamplingEngine`]. The
//! engine contract:
//! - output per series never exceeds its input
//! - a series at or under the target comes back unchanged
//! - [`SamplingMethod::None`] is the identity

pub mod downsample;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chart::{ChartPoint, SeriesKind};
use crate::error::SamplingError;

pub use downsample::{Downsampler, lttb_indices, nth_point_indices};

/// Sampling algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMethod {
    None,
    Lttb,
    NthPoint,
}

impl Default for SamplingMethod {
    fn default() -> Self {
        SamplingMethod::Lttb
    }
}

impl SamplingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SamplingMethod::None => "none",
            SamplingMethod::Lttb => "lttb",
            SamplingMethod::NthPoint => "nth_point",
        }
    }
}

/// Options for one `sample` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOptions {
    pub method: SamplingMethod,
    pub target_points: usize,
    pub series_kind: SeriesKind,
    /// Points within each series are ascending in X
    pub is_time_ordered: bool,
}

/// Series key to points, in first-seen order
pub type SeriesMap = Vec<(String, Vec<ChartPoint>)>;

/// Pluggable downsampling backend.
pub trait SamplingEngine: Send + Sync {
    fn sample(
        &self,
        series: SeriesMap,
        options: &SampleOptions,
    ) -> Result<SeriesMap, SamplingError>;
}

/// Group points by series key, keeping first-seen key order and the arrival
/// order of points within each group.
pub fn group_by_series(points: Vec<ChartPoint>) -> SeriesMap {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: SeriesMap = Vec::new();
    for point in points {
        match index.get(&point.series_key) {
            Some(&i) => groups[i].1.push(point),
            None => {
                index.insert(point.series_key.clone(), groups.len());
                groups.push((point.series_key.clone(), vec![point]));
            }
        }
    }
    groups
}
