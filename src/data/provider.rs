//! Raw period records and the provider contract that produces them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A raw field value as delivered by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

/// One sample row of a period: a timestamp plus one field per requested
/// parameter. Fields the provider has no value for are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub timestamp: Option<RawValue>,
    #[serde(flatten)]
    pub values: HashMap<String, RawValue>,
}

impl RawRecord {
    pub fn new(timestamp: impl Into<RawValue>) -> Self {
        Self {
            timestamp: Some(timestamp.into()),
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, parameter: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.values.insert(parameter.into(), value.into());
        self
    }

    pub fn value(&self, parameter: &str) -> Option<&RawValue> {
        self.values.get(parameter)
    }
}

/// Records of one period, shared between every chart that fetched them
pub type PeriodRows = Arc<Vec<RawRecord>>;

/// Source of raw period data.
#[async_trait]
pub trait PeriodDataProvider: Send + Sync {
    /// Fetch the records of `period`, carrying at least `parameters`.
    async fn fetch(
        &self,
        period: &str,
        parameters: &[String],
    ) -> Result<Vec<RawRecord>, FetchError>;
}
