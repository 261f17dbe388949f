//! Chart point assembly from raw period records.

use tracing::trace;

use super::config::{AxisMode, ChartConfig, PeriodRef};
use crate::data::{RawRecord, coerce_number, coerce_timestamp};

/// One renderable sample of one series.
///
/// In datetime mode `x` is milliseconds since the Unix epoch (UTC).
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub x: f64,
    pub y: f64,
    pub series_key: String,
    /// `source_index * y_count + param_index`
    pub series_index: usize,
    pub source_id: String,
    pub source_label: String,
    pub source_index: usize,
    pub param_index: usize,
}

pub fn series_key(source_id: &str, param_index: usize) -> String {
    format!("{source_id}:{param_index}")
}

/// Points of one period plus the number of rows or values dropped because
/// they did not coerce.
#[derive(Debug, Default)]
pub struct PeriodPoints {
    pub points: Vec<ChartPoint>,
    pub skipped: usize,
}

/// Turn one period's records into chart points, row by row.
pub fn build_period_points(
    config: &ChartConfig,
    source_index: usize,
    period: &PeriodRef,
    records: &[RawRecord],
) -> PeriodPoints {
    let y_params: Vec<&str> = config
        .active_y_parameters()
        .map(|y| y.parameter.as_str())
        .collect();
    let y_count = y_params.len();
    let keys: Vec<String> = (0..y_count).map(|i| series_key(&period.id, i)).collect();
    let x_parameter = config.x_parameter();

    let mut out = PeriodPoints {
        points: Vec::with_capacity(records.len() * y_count),
        skipped: 0,
    };

    for record in records {
        let x = match config.axis_mode {
            AxisMode::Datetime => record.timestamp.as_ref().and_then(coerce_timestamp),
            AxisMode::Time | AxisMode::Parameter => x_parameter
                .and_then(|name| record.value(name))
                .and_then(coerce_number),
        };
        let Some(x) = x else {
            out.skipped += 1;
            continue;
        };

        for (param_index, name) in y_params.iter().enumerate() {
            let Some(y) = record.value(name).and_then(coerce_number) else {
                out.skipped += 1;
                continue;
            };
            out.points.push(ChartPoint {
                x,
                y,
                series_key: keys[param_index].clone(),
                series_index: source_index * y_count + param_index,
                source_id: period.id.clone(),
                source_label: period.label.clone(),
                source_index,
                param_index,
            });
        }
    }

    if out.skipped > 0 {
        trace!(
            period = %period.id,
            skipped = out.skipped,
            "Dropped values that failed coercion"
        );
    }
    out
}
