//! Per-chart data pipeline: configuration, point assembly and the
//! coordinator that drives fetch, sampling and publication.

mod config;
mod coordinator;
mod points;

pub use config::{AxisMode, ChartConfig, FetchPlan, PeriodRef, SeriesKind, YParameter};
pub use coordinator::{ChartContext, ChartCoordinator, ChartSnapshot, ChartStatus};
pub use points::{ChartPoint, PeriodPoints, build_period_points, series_key};
