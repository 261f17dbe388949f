//! Pipeline configuration file (JSON)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, SharedFetchCache};
use crate::chart::ChartContext;
use crate::constants::chart::DEFAULT_DEBOUNCE_MS;
use crate::constants::fetch::DEFAULT_TTL_MS;
use crate::constants::sampling::LTTB_MIN_TARGET;
use crate::data::{PeriodDataProvider, PeriodRows};
use crate::error::{PipelineError, Result};
use crate::sampling::SamplingMethod;
use crate::state::{LoadingRegistry, SamplingSettings, SharedSettings};

/// Tunables for the caches, the coordinators and sampling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cache: CacheConfig,
    /// Lifetime of a shared period fetch
    pub fetch_ttl_ms: u64,
    /// Quiet period before a chart change reloads
    pub debounce_ms: u64,
    pub sampling: SamplingSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            fetch_ttl_ms: DEFAULT_TTL_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            sampling: SamplingSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Read and validate a configuration file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.max_memory.is_none() && self.cache.max_entries == 0 {
            return Err(PipelineError::Config(
                "cache.max_entries must be > 0 when no memory budget is set".to_string(),
            ));
        }
        if self.cache.max_memory == Some(0) {
            return Err(PipelineError::Config("cache.max_memory must be > 0".to_string()));
        }
        if self.cache.default_max_age_ms == 0 {
            return Err(PipelineError::Config(
                "cache.default_max_age_ms must be > 0".to_string(),
            ));
        }
        if self.cache.cleanup_interval_ms == 0 {
            return Err(PipelineError::Config(
                "cache.cleanup_interval_ms must be > 0".to_string(),
            ));
        }
        if self.fetch_ttl_ms == 0 {
            return Err(PipelineError::Config("fetch_ttl_ms must be > 0".to_string()));
        }
        if self.sampling.method == SamplingMethod::Lttb
            && self.sampling.target_points < LTTB_MIN_TARGET
        {
            return Err(PipelineError::Config(format!(
                "sampling.target_points must be at least {} for LTTB",
                LTTB_MIN_TARGET
            )));
        }
        if self.sampling.target_points == 0 {
            return Err(PipelineError::Config(
                "sampling.target_points must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fetch_ttl(&self) -> Duration {
        Duration::from_millis(self.fetch_ttl_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fetch_cache(&self) -> Arc<SharedFetchCache<PeriodRows>> {
        Arc::new(SharedFetchCache::new(self.fetch_ttl()))
    }

    /// Coordinator context using these settings and a fresh fetch cache.
    ///
    /// Returns the settings handle so the UI can change sampling later.
    pub fn chart_context(
        &self,
        provider: Arc<dyn PeriodDataProvider>,
        registry: LoadingRegistry,
    ) -> (ChartContext, SharedSettings) {
        let settings = SharedSettings::new(self.sampling);
        let ctx = ChartContext::new(provider, self.fetch_cache(), registry)
            .with_settings(Arc::new(settings.clone()))
            .with_debounce(self.debounce());
        (ctx, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FrameProvider;
    use crate::state::SettingsProvider;
    use tempfile::Builder;

    #[test]
    fn test_save_and_load() {
        let file = Builder::new().suffix(".json").tempfile().unwrap();
        let mut config = PipelineConfig::default();
        config.debounce_ms = 150;
        config.sampling.method = SamplingMethod::NthPoint;
        config.cache.max_memory = None;

        config.save(file.path()).unwrap();
        let loaded = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        let json = br#"{"fetch_ttl_ms": 1000, "cache": {"max_entries": 10}}"#;
        std::io::Write::write_all(&mut file, json).unwrap();

        let loaded = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(loaded.fetch_ttl(), Duration::from_secs(1));
        assert_eq!(loaded.cache.max_entries, 10);
        assert_eq!(loaded.cache.default_max_age_ms, CacheConfig::default().default_max_age_ms);
        assert_eq!(loaded.debounce(), Duration::from_millis(DEFAULT_DEBOUNCE_MS));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = PipelineConfig::default();
        config.fetch_ttl_ms = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut config = PipelineConfig::default();
        config.sampling.target_points = 2;
        assert!(config.validate().is_err());
        config.sampling.method = SamplingMethod::NthPoint;
        assert!(config.validate().is_ok());

        let mut config = PipelineConfig::default();
        config.cache.max_memory = None;
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_errors() {
        let missing = PipelineConfig::load(Path::new("/definitely/not/here.json"));
        assert!(matches!(missing, Err(PipelineError::Io(_))));

        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"{ not json").unwrap();
        assert!(matches!(PipelineConfig::load(file.path()), Err(PipelineError::Json(_))));
    }

    #[test]
    fn test_chart_context() {
        let mut config = PipelineConfig::default();
        config.debounce_ms = 50;
        config.sampling.target_points = 123;

        let provider: Arc<dyn PeriodDataProvider> = Arc::new(FrameProvider::new("timestamp"));
        let (ctx, settings) = config.chart_context(provider, LoadingRegistry::new());
        assert_eq!(ctx.debounce, Duration::from_millis(50));
        assert_eq!(ctx.fetch_cache.ttl(), config.fetch_ttl());
        assert_eq!(ctx.settings.sampling().target_points, 123);

        settings.update(|s| s.target_points = 7);
        assert_eq!(ctx.settings.sampling().target_points, 7);
    }
}
