//! Sampling settings and the provider the coordinator reads them from

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants::sampling::DEFAULT_TARGET_POINTS;
use crate::sampling::SamplingMethod;

/// User-facing sampling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    pub enabled: bool,
    pub method: SamplingMethod,
    /// Target points per series
    pub target_points: usize,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            method: SamplingMethod::default(),
            target_points: DEFAULT_TARGET_POINTS,
        }
    }
}

/// Source of the current settings, read once at the start of every cycle
pub trait SettingsProvider: Send + Sync {
    fn sampling(&self) -> SamplingSettings;
}

impl SettingsProvider for SamplingSettings {
    fn sampling(&self) -> SamplingSettings {
        *self
    }
}

/// Settings shared between the UI and any number of coordinators
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<SamplingSettings>>,
}

impl SharedSettings {
    pub fn new(settings: SamplingSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn set(&self, settings: SamplingSettings) {
        *self.inner.write() = settings;
    }

    pub fn update(&self, f: impl FnOnce(&mut SamplingSettings)) {
        f(&mut self.inner.write());
    }
}

impl SettingsProvider for SharedSettings {
    fn sampling(&self) -> SamplingSettings {
        *self.inner.read()
    }
}
