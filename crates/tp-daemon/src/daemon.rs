use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tp_core::config::EngineConfig;
use tp_engine::{ClassificationPipeline, HeuristicAnalyzer, ItemAnalyzer, PipelineError};
use tp_stores::action_plan::ActionPlanStore;
use tp_stores::backlog::BacklogStore;

use crate::shutdown::ShutdownSignal;

/// Loop intervals; overridable for tests and embedded use.
#[derive(Debug, Clone)]
pub struct DaemonIntervals {
    /// How often the classification pipeline fires.
    pub analysis: Duration,
    /// How often board statistics are reported (default: 300s).
    pub stats: Duration,
}

impl DaemonIntervals {
    fn from_config(config: &EngineConfig) -> Self {
        Self {
            analysis: config.pipeline.analysis_frequency(),
            stats: Duration::from_secs(300),
        }
    }
}

/// The taskpilot background daemon: owns the two stores and the
/// classification pipeline, and drives the pipeline on its configured
/// schedule until shutdown.
pub struct Daemon {
    config: EngineConfig,
    backlog: Arc<BacklogStore>,
    plan: Arc<ActionPlanStore>,
    pipeline: Arc<ClassificationPipeline>,
    shutdown: ShutdownSignal,
    intervals: DaemonIntervals,
}

impl Daemon {
    /// Build the daemon with the heuristic analyzer.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_analyzer(config, Arc::new(HeuristicAnalyzer::new()))
    }

    /// Build the daemon with a custom analyzer (tests, future providers).
    pub fn with_analyzer(config: EngineConfig, analyzer: Arc<dyn ItemAnalyzer>) -> Self {
        let backlog = Arc::new(BacklogStore::new(config.board.clone()));
        let plan = Arc::new(ActionPlanStore::new());
        let pipeline = Arc::new(ClassificationPipeline::new(
            backlog.clone(),
            plan.clone(),
            analyzer,
            config.clone(),
        ));
        let intervals = DaemonIntervals::from_config(&config);
        Self {
            config,
            backlog,
            plan,
            pipeline,
            shutdown: ShutdownSignal::new(),
            intervals,
        }
    }

    /// Override the default loop intervals.
    pub fn set_intervals(&mut self, intervals: DaemonIntervals) {
        self.intervals = intervals;
    }

    pub fn backlog(&self) -> &Arc<BacklogStore> {
        &self.backlog
    }

    pub fn plan(&self) -> &Arc<ActionPlanStore> {
        &self.plan
    }

    pub fn pipeline(&self) -> &Arc<ClassificationPipeline> {
        &self.pipeline
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a handle that can trigger shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Run the scheduling loop until shutdown (blocking).
    pub async fn run(&self) {
        info!(
            analysis_secs = self.intervals.analysis.as_secs(),
            stats_secs = self.intervals.stats.as_secs(),
            auto_analysis = self.config.pipeline.auto_analysis_enabled,
            "daemon starting event loop"
        );

        let mut analysis_interval = tokio::time::interval(self.intervals.analysis);
        let mut stats_interval = tokio::time::interval(self.intervals.stats);
        // Consume the first immediate tick so loops don't all fire at t=0.
        analysis_interval.tick().await;
        stats_interval.tick().await;

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = analysis_interval.tick() => {
                    if !self.config.pipeline.auto_analysis_enabled {
                        continue;
                    }
                    match self.pipeline.run_batch().await {
                        Ok(record) => {
                            info!(
                                processed = record.items_processed,
                                tasks_created = record.tasks_created,
                                "scheduled analysis completed"
                            );
                        }
                        Err(PipelineError::AlreadyRunning) => {
                            warn!("scheduled analysis skipped: batch already running");
                        }
                        Err(e) => {
                            warn!(error = %e, "scheduled analysis failed");
                        }
                    }
                }
                _ = stats_interval.tick() => {
                    let stats = self.backlog.stats();
                    info!(
                        total_items = stats.total,
                        analyzed = stats.analyzed,
                        avg_confidence = stats.avg_confidence,
                        tasks = self.plan.task_count(),
                        "board snapshot"
                    );
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping daemon loop");
                    break;
                }
            }
        }
    }
}
