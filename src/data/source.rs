use async_trait::async_trait;
use parking_lot::RwLock;
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::provider::{PeriodDataProvider, RawRecord, RawValue};
use crate::error::{FetchError, PipelineError};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Period data provider backed by one Polars DataFrame per period.
///
/// Each frame carries a timestamp column plus one column per parameter.
/// Fetches project the timestamp and the requested parameters into raw
/// records; parameters without a column are simply absent from every record.
pub struct FrameProvider {
    frames: RwLock<HashMap<String, DataFrame>>,
    timestamp_column: String,
}

impl FrameProvider {
    pub fn new(timestamp_column: impl Into<String>) -> Self {
        Self {
            frames: RwLock::new(HashMap::new()),
            timestamp_column: timestamp_column.into(),
        }
    }

    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    /// Register (or replace) the frame of a period
    pub fn insert(&self, period: impl Into<String>, df: DataFrame) {
        let period = period.into();
        debug!(period = %period, rows = df.height(), "Registered period frame");
        self.frames.write().insert(period, df);
    }

    /// Load a Parquet file as the frame of a period
    pub fn insert_parquet(
        &self,
        period: impl Into<String>,
        path: &Path,
    ) -> Result<(), PipelineError> {
        if !path.exists() {
            return Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }
        let df = LazyFrame::scan_parquet(path, Default::default())?.collect()?;
        self.insert(period, df);
        Ok(())
    }

    pub fn remove(&self, period: &str) -> bool {
        self.frames.write().remove(period).is_some()
    }

    /// Registered period ids, sorted
    pub fn periods(&self) -> Vec<String> {
        let mut periods: Vec<String> = self.frames.read().keys().cloned().collect();
        periods.sort();
        periods
    }

    fn project(
        &self,
        period: &str,
        df: &DataFrame,
        parameters: &[String],
    ) -> Result<Vec<RawRecord>, PolarsError> {
        profiling::scope!("FrameProvider::project");
        let height = df.height();
        let mut records = vec![RawRecord::default(); height];

        if let Ok(column) = df.column(&self.timestamp_column) {
            let values = column_values(column.as_materialized_series())?;
            for (record, value) in records.iter_mut().zip(values) {
                record.timestamp = value;
            }
        }

        for parameter in parameters {
            // Requested but not recorded for this period
            let Ok(column) = df.column(parameter) else {
                continue;
            };
            let values = column_values(column.as_materialized_series())?;
            for (record, value) in records.iter_mut().zip(values) {
                if let Some(value) = value {
                    record.values.insert(parameter.clone(), value);
                }
            }
        }

        debug!(period, rows = height, parameters = parameters.len(), "Projected period frame");
        Ok(records)
    }
}

/// Convert a column into raw values. Datetime and date columns become epoch
/// milliseconds, strings stay text, everything else is cast to `f64`.
fn column_values(series: &Series) -> Result<Vec<Option<RawValue>>, PolarsError> {
    match series.dtype() {
        DataType::String => Ok(series
            .str()?
            .into_iter()
            .map(|opt| opt.map(|s| RawValue::Text(s.to_string())))
            .collect()),
        DataType::Datetime(unit, _) => {
            let divisor = match unit {
                TimeUnit::Nanoseconds => 1_000_000.0,
                TimeUnit::Microseconds => 1_000.0,
                TimeUnit::Milliseconds => 1.0,
            };
            let ticks = series.cast(&DataType::Int64)?;
            Ok(ticks
                .i64()?
                .into_iter()
                .map(|opt| opt.map(|t| RawValue::Number(t as f64 / divisor)))
                .collect())
        }
        DataType::Date => {
            let days = series.cast(&DataType::Int32)?;
            Ok(days
                .i32()?
                .into_iter()
                .map(|opt| opt.map(|d| RawValue::Number(d as f64 * MILLIS_PER_DAY)))
                .collect())
        }
        _ => match series.cast(&DataType::Float64) {
            Ok(s) => Ok(s
                .f64()?
                .into_iter()
                .map(|opt| opt.map(RawValue::Number))
                .collect()),
            Err(_) => {
                let s = series.cast(&DataType::String)?;
                Ok(s.str()?
                    .into_iter()
                    .map(|opt| opt.map(|s| RawValue::Text(s.to_string())))
                    .collect())
            }
        },
    }
}

#[async_trait]
impl PeriodDataProvider for FrameProvider {
    async fn fetch(
        &self,
        period: &str,
        parameters: &[String],
    ) -> Result<Vec<RawRecord>, FetchError> {
        // DataFrame clones share their column buffers
        let df = self
            .frames
            .read()
            .get(period)
            .cloned()
            .ok_or_else(|| FetchError::PeriodNotFound {
                period: period.to_string(),
            })?;

        self.project(period, &df, parameters)
            .map_err(|e| FetchError::Data {
                period: period.to_string(),
                message: e.to_string(),
            })
    }
}
