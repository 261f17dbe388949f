use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

/// Set of charts currently loading.
///
/// Each coordinator registers only its own chart id. A chart is loading
/// exactly while its id is present; ids are removed on completion, never
/// flagged false. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct LoadingRegistry {
    charts: Arc<Mutex<HashSet<String>>>,
}

impl LoadingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the chart was already registered
    pub fn register(&self, chart_id: &str) -> bool {
        let added = self.charts.lock().insert(chart_id.to_string());
        if added {
            trace!(chart = chart_id, "Chart loading");
        }
        added
    }

    /// Returns false if the chart was not registered
    pub fn unregister(&self, chart_id: &str) -> bool {
        let removed = self.charts.lock().remove(chart_id);
        if removed {
            trace!(chart = chart_id, "Chart done loading");
        }
        removed
    }

    pub fn is_loading(&self, chart_id: &str) -> bool {
        self.charts.lock().contains(chart_id)
    }

    pub fn any_loading(&self) -> bool {
        !self.charts.lock().is_empty()
    }

    /// Loading chart ids, sorted
    pub fn loading_charts(&self) -> Vec<String> {
        let mut charts: Vec<String> = self.charts.lock().iter().cloned().collect();
        charts.sort();
        charts
    }
}
