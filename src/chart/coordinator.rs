//! Chart data coordinator
//!
//! One coordinator drives one chart. Configuration changes are debounced,
//! every change bumps the chart's generation, and only a cycle started for
//! the current generation may publish.
//!
//! ```text
//! update() ──► driver ──(debounce)──► cycle task ──► SharedFetchCache ──► provider
//!                ▲                        │
//!                └──── outcome(gen) ◄─────┘   published only if gen is current
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use super::config::{AxisMode, ChartConfig, SeriesKind};
use super::points::{ChartPoint, build_period_points};
use crate::cache::SharedFetchCache;
use crate::constants::chart::DEFAULT_DEBOUNCE_MS;
use crate::data::{PeriodDataProvider, PeriodRows};
use crate::error::PipelineError;
use crate::sampling::{Downsampler, SampleOptions, SamplingEngine, group_by_series};
use crate::state::{LoadingRegistry, SamplingSettings, SettingsProvider};

/// Chart lifecycle as seen by UI collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartStatus {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// What a chart currently shows.
///
/// `points` is the last successful result; a failed cycle records `error`
/// and leaves it in place.
#[derive(Debug, Clone)]
pub struct ChartSnapshot {
    pub points: Arc<Vec<ChartPoint>>,
    pub status: ChartStatus,
    pub error: Option<Arc<PipelineError>>,
    /// Generation of the cycle that last touched this snapshot
    pub generation: u64,
}

impl Default for ChartSnapshot {
    fn default() -> Self {
        Self {
            points: Arc::new(Vec::new()),
            status: ChartStatus::Idle,
            error: None,
            generation: 0,
        }
    }
}

impl ChartSnapshot {
    pub fn is_loading(&self) -> bool {
        self.status == ChartStatus::Loading
    }
}

/// Collaborators shared by every coordinator of an application
#[derive(Clone)]
pub struct ChartContext {
    pub provider: Arc<dyn PeriodDataProvider>,
    pub fetch_cache: Arc<SharedFetchCache<PeriodRows>>,
    pub settings: Arc<dyn SettingsProvider>,
    pub sampler: Arc<dyn SamplingEngine>,
    pub registry: LoadingRegistry,
    pub debounce: Duration,
}

impl ChartContext {
    /// Default sampling settings, the built-in [`Downsampler`] and the
    /// default debounce delay.
    pub fn new(
        provider: Arc<dyn PeriodDataProvider>,
        fetch_cache: Arc<SharedFetchCache<PeriodRows>>,
        registry: LoadingRegistry,
    ) -> Self {
        Self {
            provider,
            fetch_cache,
            settings: Arc::new(SamplingSettings::default()),
            sampler: Arc::new(Downsampler::new()),
            registry,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn SamplingEngine>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

enum Command {
    Update(ChartConfig),
    Refresh,
}

struct CycleOutcome {
    generation: u64,
    result: Result<Vec<ChartPoint>, PipelineError>,
}

/// Handle to a chart's driver task.
///
/// Must be created inside a tokio runtime. Dropping the handle stops the
/// driver and removes the chart from the loading registry; a cycle already
/// fetching finishes on its own but is never published.
pub struct ChartCoordinator {
    chart_id: String,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ChartSnapshot>,
    registry: LoadingRegistry,
    driver: JoinHandle<()>,
}

impl ChartCoordinator {
    pub fn new(chart_id: impl Into<String>, ctx: ChartContext) -> Self {
        let chart_id = chart_id.into();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(ChartSnapshot::default());
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let registry = ctx.registry.clone();

        let driver = Driver {
            chart_id: chart_id.clone(),
            ctx,
            config: None,
            generation: 0,
            deadline: None,
            commands: command_rx,
            results_tx,
            results_rx,
            snapshot: snapshot_tx,
        };

        Self {
            chart_id,
            commands,
            snapshot,
            registry,
            driver: tokio::spawn(driver.run()),
        }
    }

    /// Create a coordinator and schedule a first cycle for `config`.
    pub fn with_config(config: ChartConfig, ctx: ChartContext) -> Self {
        let coordinator = Self::new(config.chart_id.clone(), ctx);
        coordinator.update(config);
        coordinator
    }

    pub fn chart_id(&self) -> &str {
        &self.chart_id
    }

    /// Replace the chart configuration. Changes arriving within the debounce
    /// delay of each other collapse into one cycle using the last of them.
    pub fn update(&self, mut config: ChartConfig) {
        config.chart_id = self.chart_id.clone();
        let _ = self.commands.send(Command::Update(config));
    }

    /// Re-run the current configuration, e.g. after clearing the fetch cache.
    pub fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh);
    }

    pub fn subscribe(&self) -> watch::Receiver<ChartSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.registry.is_loading(&self.chart_id)
    }

    /// Stop the driver. Equivalent to dropping the handle.
    pub fn shutdown(self) {}
}

impl Drop for ChartCoordinator {
    fn drop(&mut self) {
        self.driver.abort();
        self.registry.unregister(&self.chart_id);
    }
}

struct Driver {
    chart_id: String,
    ctx: ChartContext,
    config: Option<ChartConfig>,
    generation: u64,
    deadline: Option<Instant>,
    commands: mpsc::UnboundedReceiver<Command>,
    results_tx: mpsc::UnboundedSender<CycleOutcome>,
    results_rx: mpsc::UnboundedReceiver<CycleOutcome>,
    snapshot: watch::Sender<ChartSnapshot>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Update(config)) => {
                        self.config = Some(config);
                        self.schedule();
                    }
                    Some(Command::Refresh) => self.schedule(),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.start_cycle();
                }
                Some(outcome) = self.results_rx.recv() => self.finish(outcome),
            }
        }
        self.ctx.registry.unregister(&self.chart_id);
    }

    /// Supersede whatever is pending or in flight and restart the debounce
    fn schedule(&mut self) {
        self.generation += 1;
        self.deadline = Some(Instant::now() + self.ctx.debounce);
        debug!(chart = %self.chart_id, generation = self.generation, "Cycle scheduled");
    }

    fn start_cycle(&mut self) {
        let generation = self.generation;
        let Some(config) = self.config.clone() else {
            return;
        };

        if config.is_empty() {
            debug!(chart = %self.chart_id, generation, "Nothing to fetch");
            self.ctx.registry.unregister(&self.chart_id);
            self.publish(generation, Ok(Vec::new()));
            return;
        }

        self.ctx.registry.register(&self.chart_id);
        self.snapshot.send_modify(|s| {
            s.status = ChartStatus::Loading;
            s.generation = generation;
        });

        let settings = self.ctx.settings.sampling();
        let ctx = self.ctx.clone();
        let results = self.results_tx.clone();
        debug!(
            chart = %self.chart_id,
            generation,
            periods = config.periods.len(),
            "Cycle started"
        );
        tokio::spawn(async move {
            let result = run_cycle(&ctx, &config, settings).await;
            let _ = results.send(CycleOutcome { generation, result });
        });
    }

    fn finish(&mut self, outcome: CycleOutcome) {
        if outcome.generation != self.generation {
            debug!(
                chart = %self.chart_id,
                generation = outcome.generation,
                current = self.generation,
                "Discarding superseded cycle"
            );
            return;
        }
        self.ctx.registry.unregister(&self.chart_id);
        self.publish(outcome.generation, outcome.result);
    }

    fn publish(&self, generation: u64, result: Result<Vec<ChartPoint>, PipelineError>) {
        match result {
            Ok(points) => {
                debug!(
                    chart = %self.chart_id,
                    generation,
                    points = points.len(),
                    "Cycle succeeded"
                );
                self.snapshot.send_replace(ChartSnapshot {
                    points: Arc::new(points),
                    status: ChartStatus::Succeeded,
                    error: None,
                    generation,
                });
            }
            Err(e) => {
                debug!(chart = %self.chart_id, generation, error = %e, "Cycle failed");
                self.snapshot.send_modify(|s| {
                    s.status = ChartStatus::Failed;
                    s.error = Some(Arc::new(e));
                    s.generation = generation;
                });
            }
        }
        crate::perf::finish_frame();
    }
}

/// Fetch every period, assemble points, sample and order them.
async fn run_cycle(
    ctx: &ChartContext,
    config: &ChartConfig,
    settings: SamplingSettings,
) -> Result<Vec<ChartPoint>, PipelineError> {
    let plan = config.fetch_plan();

    let fetches = config.periods.iter().map(|period| {
        let provider = Arc::clone(&ctx.provider);
        let period_id = period.id.clone();
        let parameters = plan.parameters.clone();
        ctx.fetch_cache.get(
            &period.id,
            &plan.parameters,
            Some(config.axis_mode),
            Some(&plan.signature),
            move || async move { provider.fetch(&period_id, &parameters).await.map(Arc::new) },
        )
    });
    // Completion order is irrelevant: results come back in period order
    let results = join_all(fetches).await;

    let mut points = {
        profiling::scope!("assemble_points");
        let mut points = Vec::new();
        for (source_index, (period, rows)) in config.periods.iter().zip(results).enumerate() {
            let rows = rows?;
            points.extend(build_period_points(config, source_index, period, &rows).points);
        }
        points
    };

    if settings.enabled && points.len() > settings.target_points {
        profiling::scope!("sample_points");
        let kinds: Vec<SeriesKind> = config.active_y_parameters().map(|y| y.kind).collect();
        let before = points.len();
        let mut sampled = Vec::with_capacity(settings.target_points);

        for (key, group) in group_by_series(points) {
            let series_kind = group
                .first()
                .and_then(|p| kinds.get(p.param_index))
                .copied()
                .unwrap_or_default();
            let options = SampleOptions {
                method: settings.method,
                target_points: settings.target_points,
                series_kind,
                is_time_ordered: config.axis_mode.is_time_ordered(),
            };
            for (_, reduced) in ctx.sampler.sample(vec![(key, group)], &options)? {
                sampled.extend(reduced);
            }
        }

        if config.axis_mode == AxisMode::Datetime {
            sampled.sort_by(|a, b| a.x.total_cmp(&b.x));
        }
        debug!(
            chart = %config.chart_id,
            before,
            after = sampled.len(),
            method = settings.method.as_str(),
            "Sampled chart points"
        );
        points = sampled;
    }

    Ok(points)
}
