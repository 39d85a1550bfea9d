// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{Arc, Mutex, RwLock},
    thread,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::client::{AdvisoryClient, HttpAdvisoryClient};
use crate::configuration::Config;
use crate::error::{Error, Result};
use crate::filter::FilterManager;
use crate::policy::PolicyManager;
use crate::recommendation::{FilterRule, ParsedRecommendations};
use crate::recommender::Recommender;
use crate::sampler::TelemetrySampler;
use crate::signal::{LogEntry, MetricDataPoint, Signal, TraceSpan};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::utils::{ShutdownReceiver, ShutdownSignaler, WorkerHandle};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The pipeline-facing façade.
///
/// Batches flow through `process_*` synchronously: they are buffered for
/// sampling, filtered against the active rule set, and returned. In the
/// background, a worker thread runs the recommendation loop, the policy
/// watcher and the optional stats reporter; none of them ever block the data
/// path.
pub struct Processor {
    config: Arc<Config>,
    sampler: Arc<TelemetrySampler>,
    recommender: Arc<Recommender>,
    policy_manager: Arc<PolicyManager>,
    filter_manager: Arc<FilterManager>,
    stats: Arc<PipelineStats>,
    active_recommendations: Arc<RwLock<Option<Arc<ParsedRecommendations>>>>,
    cancel: Mutex<Option<CancellationToken>>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl Processor {
    /// Builds a processor talking to the configured HTTP advisory endpoint.
    pub fn new(config: Config) -> Result<Self> {
        config.require_api_key()?;
        let client = Arc::new(HttpAdvisoryClient::new(&config)?);
        Self::with_client(config, client)
    }

    /// Same as [`new`](Self::new) with a caller-supplied advisory client, the
    /// seam used by tests and scripted dry runs.
    pub fn with_client(config: Config, client: Arc<dyn AdvisoryClient>) -> Result<Self> {
        crate::log::set_max_level(config.log_level());

        let stats = Arc::new(PipelineStats::default());
        let sampler = Arc::new(TelemetrySampler::new(config.max_sample_size()));
        let recommender = Arc::new(Recommender::new(&config, client, stats.clone()));
        let overlay = PolicyManager::overlay_from_labels(
            config.required_labels(),
            config.forbidden_labels(),
        );
        let policy_manager = Arc::new(PolicyManager::new(
            config.policy_file().cloned(),
            overlay,
        ));
        policy_manager.load()?;
        let filter_manager = Arc::new(FilterManager::new(
            config.max_filter_rules(),
            config.filter_timeout(),
            stats.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            sampler,
            recommender,
            policy_manager,
            filter_manager,
            stats,
            active_recommendations: Arc::new(RwLock::new(None)),
            cancel: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    /// Probes the advisory endpoint and launches the background tasks.
    ///
    /// The probe failing is fatal only when static fallback is disabled;
    /// otherwise the processor starts degraded and serves the built-in set.
    /// The given cancellation token stops every background task.
    pub fn start(&self, cancel: CancellationToken) -> Result<()> {
        let mut worker_slot = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if worker_slot.is_some() {
            return Ok(());
        }
        crate::sift_info!("Starting sift processor");

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| Error::Worker(format!("failed to create runtime: {err}")))?;

        if let Err(err) = rt.block_on(self.recommender.validate_connection()) {
            if !self.config.fallback_to_static() {
                return Err(err);
            }
            crate::sift_warn!(
                "Advisory endpoint probe failed, will serve static recommendations: {}",
                err
            );
        }

        let shutdown_finished = ShutdownSignaler::new();
        let shutdown_receiver = ShutdownReceiver::new(shutdown_finished.clone());
        let tasks = BackgroundTasks {
            config: self.config.clone(),
            sampler: self.sampler.clone(),
            recommender: self.recommender.clone(),
            policy_manager: self.policy_manager.clone(),
            filter_manager: self.filter_manager.clone(),
            stats: self.stats.clone(),
            active_recommendations: self.active_recommendations.clone(),
            cancel: cancel.clone(),
        };

        let join_handle = thread::spawn(move || {
            let _shutdown_receiver = shutdown_receiver;
            let cancel = tasks.cancel.clone();
            rt.block_on(async {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tasks.run() => {}
                }
            });
            crate::sift_debug!("Sift processor worker exited");
        });

        *worker_slot = Some(WorkerHandle::new(shutdown_finished, join_handle));
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel);
        Ok(())
    }

    /// Signals the background tasks and joins the worker. Idempotent.
    pub fn stop(&self) {
        if let Some(cancel) = self
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            crate::sift_info!("Stopping sift processor");
            cancel.cancel();
        }
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            if let Err(err) = worker.wait_for_shutdown(SHUTDOWN_TIMEOUT) {
                crate::sift_error!("Sift processor worker did not stop cleanly: {}", err);
            }
        }
    }

    /// Buffers the batch for sampling and returns it with dropped spans
    /// elided, order preserved. Never blocks on the advisory path.
    pub fn process_traces(&self, traces: Vec<TraceSpan>) -> Vec<TraceSpan> {
        self.sampler.buffer_traces(&traces);
        PipelineStats::add(&self.stats.traces_processed, traces.len() as u64);
        let before = traces.len();
        let kept: Vec<TraceSpan> = traces
            .into_iter()
            .filter(|span| !self.filter_manager.evaluate(&Signal::Trace(span)))
            .collect();
        PipelineStats::add(&self.stats.traces_dropped, (before - kept.len()) as u64);
        kept
    }

    pub fn process_metrics(&self, metrics: Vec<MetricDataPoint>) -> Vec<MetricDataPoint> {
        self.sampler.buffer_metrics(&metrics);
        PipelineStats::add(&self.stats.metrics_processed, metrics.len() as u64);
        let before = metrics.len();
        let kept: Vec<MetricDataPoint> = metrics
            .into_iter()
            .filter(|metric| !self.filter_manager.evaluate(&Signal::Metric(metric)))
            .collect();
        PipelineStats::add(&self.stats.metrics_dropped, (before - kept.len()) as u64);
        kept
    }

    pub fn process_logs(&self, logs: Vec<LogEntry>) -> Vec<LogEntry> {
        self.sampler.buffer_logs(&logs);
        PipelineStats::add(&self.stats.logs_processed, logs.len() as u64);
        let before = logs.len();
        let kept: Vec<LogEntry> = logs
            .into_iter()
            .filter(|log| !self.filter_manager.evaluate(&Signal::Log(log)))
            .collect();
        PipelineStats::add(&self.stats.logs_dropped, (before - kept.len()) as u64);
        kept
    }

    /// The most recent cycle's parsed recommendations, if any.
    pub fn get_active_recommendations(&self) -> Option<Arc<ParsedRecommendations>> {
        self.active_recommendations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get_active_filters(&self) -> Vec<FilterRule> {
        self.filter_manager.active_rules()
    }

    /// Installs rules directly, bypassing the recommendation loop. Subject to
    /// the same uniqueness and cap checks.
    pub fn install_filters(&self, rules: &[FilterRule]) -> usize {
        self.filter_manager.install(rules)
    }

    pub fn clear_filters(&self) {
        self.filter_manager.clear();
    }

    pub fn clear_cache(&self) {
        self.recommender.clear_cache();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Everything the worker thread owns. Runs the recommendation loop, the
/// policy watcher, the rate-limiter refill, and the optional stats reporter
/// until cancelled.
struct BackgroundTasks {
    config: Arc<Config>,
    sampler: Arc<TelemetrySampler>,
    recommender: Arc<Recommender>,
    policy_manager: Arc<PolicyManager>,
    filter_manager: Arc<FilterManager>,
    stats: Arc<PipelineStats>,
    active_recommendations: Arc<RwLock<Option<Arc<ParsedRecommendations>>>>,
    cancel: CancellationToken,
}

impl BackgroundTasks {
    async fn run(self) {
        let refill = self.recommender.refill_task(self.cancel.clone());
        if self.config.metrics_enabled() {
            tokio::join!(
                self.recommendation_loop(),
                self.policy_loop(),
                self.stats_loop(),
                refill,
            );
        } else {
            tokio::join!(self.recommendation_loop(), self.policy_loop(), refill);
        }
    }

    async fn recommendation_loop(&self) {
        let interval = self.config.sampling_interval();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the immediate first tick
        loop {
            ticker.tick().await;
            let started = Instant::now();
            self.run_cycle().await;
            if started.elapsed() > interval {
                // The tick that would have fired during this cycle is gone
                PipelineStats::incr(&self.stats.cycles_overrun);
                crate::sift_warn!(
                    "Recommendation cycle overran the sampling interval ({:?})",
                    started.elapsed()
                );
            }
        }
    }

    async fn run_cycle(&self) {
        crate::sift_debug!("Generating recommendations");
        PipelineStats::incr(&self.stats.cycles_run);
        self.filter_manager.remove_expired();

        let Some(sample) = self.sampler.draw() else {
            crate::sift_debug!("No telemetry buffered, skipping cycle");
            PipelineStats::incr(&self.stats.cycles_skipped_empty);
            return;
        };

        let policies = self.policy_manager.current();
        match self
            .recommender
            .recommend(&sample, &policies, &self.cancel)
            .await
        {
            Ok(parsed) => {
                *self
                    .active_recommendations
                    .write()
                    .unwrap_or_else(|e| e.into_inner()) = Some(parsed.clone());
                if self.config.auto_apply_filters() {
                    self.filter_manager.install(&parsed.all_rules());
                }
            }
            Err(Error::Cancelled) => {}
            Err(err) => {
                crate::sift_error!("Failed to generate recommendations: {}", err);
            }
        }
    }

    async fn policy_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.policy_reload_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if self.policy_manager.reload_if_changed() {
                PipelineStats::incr(&self.stats.policy_reloads);
            }
        }
    }

    async fn stats_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.metrics_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            crate::sift_info!("Pipeline stats: {:?}", self.stats.snapshot());
        }
    }
}
