//! Built-in sampling engine: LTTB and nth-point.
//!
//! LTTB keeps visual shape for connected, X-ordered lines. Scatter series and
//! series that are not ordered in X fall back to nth-point, which only thins
//! the data uniformly.

use tracing::trace;

use super::{SampleOptions, SamplingEngine, SamplingMethod, SeriesMap};
use crate::chart::{ChartPoint, SeriesKind};
use crate::constants::sampling::LTTB_MIN_TARGET;
use crate::error::SamplingError;

/// Default [`SamplingEngine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Downsampler;

impl Downsampler {
    pub fn new() -> Self {
        Self
    }

    fn effective_method(options: &SampleOptions) -> SamplingMethod {
        match options.method {
            SamplingMethod::Lttb
                if !options.is_time_ordered || options.series_kind == SeriesKind::Scatter =>
            {
                SamplingMethod::NthPoint
            }
            method => method,
        }
    }

    fn sample_series(
        points: Vec<ChartPoint>,
        method: SamplingMethod,
        target: usize,
    ) -> Result<Vec<ChartPoint>, SamplingError> {
        if points.len() <= target {
            return Ok(points);
        }
        let keep = match method {
            SamplingMethod::None => return Ok(points),
            SamplingMethod::Lttb => {
                let xy: Vec<(f64, f64)> = points.iter().map(|p| (p.x, p.y)).collect();
                lttb_indices(&xy, target)?
            }
            SamplingMethod::NthPoint => nth_point_indices(points.len(), target),
        };
        Ok(select(points, &keep))
    }
}

impl SamplingEngine for Downsampler {
    fn sample(
        &self,
        series: SeriesMap,
        options: &SampleOptions,
    ) -> Result<SeriesMap, SamplingError> {
        profiling::scope!("Downsampler::sample");
        let method = Self::effective_method(options);
        series
            .into_iter()
            .map(|(key, points)| {
                let before = points.len();
                let sampled = Self::sample_series(points, method, options.target_points)?;
                trace!(
                    series = %key,
                    method = method.as_str(),
                    before,
                    after = sampled.len(),
                    "Sampled series"
                );
                Ok((key, sampled))
            })
            .collect()
    }
}

/// Keep the points at `indices` (ascending).
fn select(points: Vec<ChartPoint>, indices: &[usize]) -> Vec<ChartPoint> {
    let mut wanted = indices.iter().copied().peekable();
    points
        .into_iter()
        .enumerate()
        .filter_map(|(i, p)| {
            if wanted.peek() == Some(&i) {
                wanted.next();
                Some(p)
            } else {
                None
            }
        })
        .collect()
}

/// Every `ceil(len / target)`th index starting at 0, at most `target` of them.
pub fn nth_point_indices(len: usize, target: usize) -> Vec<usize> {
    if len <= target {
        return (0..len).collect();
    }
    if target == 0 {
        return Vec::new();
    }
    let step = len.div_ceil(target);
    (0..len).step_by(step).take(target).collect()
}

/// LTTB (Largest Triangle Three Buckets) index selection.
///
/// Returns exactly `target` ascending indices when `data.len() > target`;
/// the first and last points are always kept.
pub fn lttb_indices(data: &[(f64, f64)], target: usize) -> Result<Vec<usize>, SamplingError> {
    let n = data.len();
    if n <= target {
        return Ok((0..n).collect());
    }
    if target < LTTB_MIN_TARGET {
        return Err(SamplingError::TargetTooSmall {
            method: "LTTB",
            minimum: LTTB_MIN_TARGET,
            target,
        });
    }

    let mut result = Vec::with_capacity(target);

    // Always include first point
    result.push(0);

    // Interior points split into target - 2 buckets
    let bucket_size = (n - 2) as f64 / (target - 2) as f64;
    let mut a = 0usize;

    for i in 0..(target - 2) {
        let bucket_start = (i as f64 * bucket_size).floor() as usize + 1;
        let bucket_end = (((i + 1) as f64 * bucket_size).floor() as usize + 1).min(n - 1);

        // Average of next bucket
        let next_start = bucket_end;
        let next_end = (((i + 2) as f64 * bucket_size).floor() as usize + 1).min(n);

        let (avg_x, avg_y) = if next_start < next_end {
            let sum: (f64, f64) = data[next_start..next_end]
                .iter()
                .fold((0.0, 0.0), |acc, &(x, y)| (acc.0 + x, acc.1 + y));
            let count = (next_end - next_start) as f64;
            (sum.0 / count, sum.1 / count)
        } else {
            data[n - 1]
        };

        // Find point with largest triangle area
        let mut max_area = -1.0f64;
        let mut max_idx = bucket_start;
        let (ax, ay) = data[a];

        for (j, &(bx, by)) in data.iter().enumerate().take(bucket_end).skip(bucket_start) {
            let area = ((ax - avg_x) * (by - ay) - (ax - bx) * (avg_y - ay)).abs();
            if area > max_area {
                max_area = area;
                max_idx = j;
            }
        }

        result.push(max_idx);
        a = max_idx;
    }

    // Always include last point
    result.push(n - 1);
    Ok(result)
}
