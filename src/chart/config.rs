//! Chart configuration as consumed by the coordinator, and the fetch plan
//! derived from it.

use serde::{Deserialize, Serialize};

use crate::constants::chart::SIGNATURE_SEPARATOR;

/// How the X axis is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisMode {
    /// Calendar time taken from each record's timestamp
    Datetime,
    /// Elapsed time carried by the X parameter
    Time,
    /// Any numeric X parameter
    Parameter,
}

impl Default for AxisMode {
    fn default() -> Self {
        AxisMode::Datetime
    }
}

impl AxisMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AxisMode::Datetime => "datetime",
            AxisMode::Time => "time",
            AxisMode::Parameter => "parameter",
        }
    }

    /// Whether X values come from a parameter rather than the timestamp
    pub fn needs_x_parameter(self) -> bool {
        !matches!(self, AxisMode::Datetime)
    }

    /// Whether points arrive ordered by X
    pub fn is_time_ordered(self) -> bool {
        matches!(self, AxisMode::Datetime | AxisMode::Time)
    }
}

/// Series rendering kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Line,
    Scatter,
}

impl Default for SeriesKind {
    fn default() -> Self {
        SeriesKind::Line
    }
}

impl SeriesKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SeriesKind::Line => "line",
            SeriesKind::Scatter => "scatter",
        }
    }
}

/// One Y series: a parameter plus display metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YParameter {
    #[serde(default)]
    pub kind: SeriesKind,
    pub parameter: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl YParameter {
    pub fn new(kind: SeriesKind, parameter: impl Into<String>) -> Self {
        Self {
            kind,
            parameter: parameter.into(),
            label: None,
        }
    }

    pub fn line(parameter: impl Into<String>) -> Self {
        Self::new(SeriesKind::Line, parameter)
    }

    pub fn scatter(parameter: impl Into<String>) -> Self {
        Self::new(SeriesKind::Scatter, parameter)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.parameter)
    }
}

/// A selected data-source period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRef {
    pub id: String,
    pub label: String,
}

impl PeriodRef {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Everything the coordinator needs to know about one chart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub chart_id: String,
    #[serde(default)]
    pub periods: Vec<PeriodRef>,
    #[serde(default)]
    pub axis_mode: AxisMode,
    #[serde(default)]
    pub x_parameter: Option<String>,
    #[serde(default)]
    pub y_parameters: Vec<YParameter>,
}

/// Parameters to fetch for one cycle and the signature of the Y layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// De-duplicated in first-seen order
    pub parameters: Vec<String>,
    /// `kind:parameter` of every Y parameter, in order
    pub signature: String,
}

impl ChartConfig {
    pub fn new(chart_id: impl Into<String>) -> Self {
        Self {
            chart_id: chart_id.into(),
            ..Default::default()
        }
    }

    /// X parameter, if one is set and non-empty
    pub fn x_parameter(&self) -> Option<&str> {
        self.x_parameter
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Y parameters that name a parameter
    pub fn active_y_parameters(&self) -> impl Iterator<Item = &YParameter> {
        self.y_parameters
            .iter()
            .filter(|y| !y.parameter.trim().is_empty())
    }

    /// True when the chart cannot produce points: no periods, no Y
    /// parameters, or an X-parameter axis without an X parameter.
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
            || self.active_y_parameters().next().is_none()
            || (self.axis_mode.needs_x_parameter() && self.x_parameter().is_none())
    }

    pub fn fetch_plan(&self) -> FetchPlan {
        let mut parameters: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !parameters.iter().any(|p| p == name) {
                parameters.push(name.to_string());
            }
        };

        if self.axis_mode.needs_x_parameter() {
            if let Some(x) = self.x_parameter() {
                push(x);
            }
        }
        for y in self.active_y_parameters() {
            push(&y.parameter);
        }

        let signature = self
            .active_y_parameters()
            .map(|y| format!("{}:{}", y.kind.as_str(), y.parameter))
            .collect::<Vec<_>>()
            .join(SIGNATURE_SEPARATOR);

        FetchPlan {
            parameters,
            signature,
        }
    }
}
