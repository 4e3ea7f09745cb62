use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use tp_core::config::EngineConfig;
use tp_core::ids;
use tp_core::types::{
    ActionOrigin, AiAnalysis, BacklogColumn, BacklogItem, Classification, ItemStatus, NewTask,
    ProcessingRecord, SynergyAction, Task,
};
use tp_stores::action_plan::{ActionPlanStore, TaskFilter};
use tp_stores::audit::BoundedLog;
use tp_stores::backlog::BacklogStore;

use crate::analyzer::{AnalyzerError, ItemAnalyzer};

/// Processing history retention; oldest records are evicted first.
pub const PROCESSING_HISTORY_CAP: usize = 50;

// ---------------------------------------------------------------------------
// State / errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Processing,
    Error,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Overlapping runs are rejected, never queued.
    #[error("a processing batch is already running")]
    AlreadyRunning,
    #[error("processing run failed: {0}")]
    RunFailed(String),
}

#[derive(Default)]
struct Counters {
    items_processed: usize,
    items_approved: usize,
    items_rejected: usize,
    items_moved: usize,
    tasks_created: usize,
    items_failed: usize,
    analyzed: usize,
    confidence_sum: f64,
}

// ---------------------------------------------------------------------------
// ClassificationPipeline
// ---------------------------------------------------------------------------

/// Consumes unanalyzed `Ideas` items in batches: scores each one, attaches
/// the analysis record, scans every action-plan task for synergies, and
/// applies the triage outcome. Uses the same store operations a manual
/// caller would; no privileged access path.
pub struct ClassificationPipeline {
    backlog: Arc<BacklogStore>,
    plan: Arc<ActionPlanStore>,
    analyzer: Arc<dyn ItemAnalyzer>,
    config: EngineConfig,
    running: AtomicBool,
    state: Mutex<PipelineState>,
    history: Mutex<BoundedLog<ProcessingRecord>>,
    next_run_at: Mutex<Option<DateTime<Utc>>>,
}

impl ClassificationPipeline {
    pub fn new(
        backlog: Arc<BacklogStore>,
        plan: Arc<ActionPlanStore>,
        analyzer: Arc<dyn ItemAnalyzer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            backlog,
            plan,
            analyzer,
            config,
            running: AtomicBool::new(false),
            state: Mutex::new(PipelineState::Idle),
            history: Mutex::new(BoundedLog::new(PROCESSING_HISTORY_CAP)),
            next_run_at: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().expect("pipeline state lock poisoned")
    }

    /// Processing history, oldest first.
    pub fn history(&self) -> Vec<ProcessingRecord> {
        self.history
            .lock()
            .expect("pipeline history lock poisoned")
            .to_vec()
    }

    pub fn next_run_at(&self) -> Option<DateTime<Utc>> {
        *self
            .next_run_at
            .lock()
            .expect("pipeline schedule lock poisoned")
    }

    /// Execute one processing batch. Rejects (does not queue) a run while
    /// another is in flight. Always records a processing-history entry and
    /// schedules the next run, even when the run fails.
    pub async fn run_batch(&self) -> Result<ProcessingRecord, PipelineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::AlreadyRunning);
        }
        self.set_state(PipelineState::Processing);
        let started_at = ids::now();
        let started = Instant::now();

        let (counters, run_error) = self.process_batch().await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let record = ProcessingRecord {
            id: ids::new_id("run"),
            started_at,
            items_processed: counters.items_processed,
            items_approved: counters.items_approved,
            items_rejected: counters.items_rejected,
            items_moved: counters.items_moved,
            tasks_created: counters.tasks_created,
            elapsed_ms,
            avg_confidence: if counters.analyzed == 0 {
                0.0
            } else {
                counters.confidence_sum / counters.analyzed as f64
            },
        };
        self.history
            .lock()
            .expect("pipeline history lock poisoned")
            .push(record.clone());

        let frequency = chrono::Duration::from_std(self.config.pipeline.analysis_frequency())
            .unwrap_or_else(|_| chrono::Duration::hours(6));
        *self
            .next_run_at
            .lock()
            .expect("pipeline schedule lock poisoned") = Some(ids::now() + frequency);

        let result = match run_error {
            None => {
                self.set_state(PipelineState::Idle);
                info!(
                    processed = record.items_processed,
                    approved = record.items_approved,
                    rejected = record.items_rejected,
                    moved = record.items_moved,
                    tasks_created = record.tasks_created,
                    failed = counters.items_failed,
                    elapsed_ms,
                    "processing batch completed"
                );
                Ok(record)
            }
            Some(message) => {
                // The next scheduled run still proceeds from Error state.
                self.set_state(PipelineState::Error);
                error!(error = %message, "processing run failed");
                Err(PipelineError::RunFailed(message))
            }
        };
        self.running.store(false, Ordering::SeqCst);
        result
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().expect("pipeline state lock poisoned") = state;
    }

    async fn process_batch(&self) -> (Counters, Option<String>) {
        let mut counters = Counters::default();
        let batch = self
            .backlog
            .unanalyzed_in(BacklogColumn::Ideas, self.config.pipeline.batch_size);
        debug!(count = batch.len(), "batch selected");

        for item in batch {
            counters.items_processed += 1;
            // Refresh the cross-join base per item so tasks created earlier
            // in this run are visible to later items.
            let tasks = if self.config.integrations.sync_with_action_plan {
                self.plan.filter_tasks(&TaskFilter::default())
            } else {
                Vec::new()
            };
            match self.analyze_with_retry(&item, &tasks).await {
                Ok(analysis) => {
                    counters.analyzed += 1;
                    counters.confidence_sum += f64::from(analysis.confidence);
                    self.apply_outcome(&item, analysis, &mut counters);
                }
                Err(AnalyzerError::Fatal(message)) => {
                    return (counters, Some(message));
                }
                Err(AnalyzerError::Item(message)) => {
                    warn!(item_id = %item.id, error = %message, "item analysis failed; batch continues");
                    counters.items_failed += 1;
                }
            }
        }
        (counters, None)
    }

    /// One item's analysis, bounded by `timeout_per_item` per attempt and
    /// retried up to `retry_attempts` times.
    async fn analyze_with_retry(
        &self,
        item: &BacklogItem,
        tasks: &[Task],
    ) -> Result<AiAnalysis, AnalyzerError> {
        let cfg = &self.config.pipeline;
        let mut last = AnalyzerError::Item("no analysis attempts made".to_string());
        for attempt in 1..=cfg.retry_attempts + 1 {
            match tokio::time::timeout(cfg.timeout_per_item(), self.analyzer.analyze(item, tasks))
                .await
            {
                Ok(Ok(analysis)) => return Ok(analysis),
                Ok(Err(fatal @ AnalyzerError::Fatal(_))) => return Err(fatal),
                Ok(Err(err)) => {
                    warn!(item_id = %item.id, attempt, error = %err, "analysis attempt failed");
                    last = err;
                }
                Err(_) => {
                    warn!(item_id = %item.id, attempt, "analysis attempt timed out");
                    last = AnalyzerError::Item(format!(
                        "timed out after {}s",
                        cfg.timeout_per_item_secs
                    ));
                }
            }
        }
        Err(last)
    }

    /// Attach the analysis and act on the verdict. Every mutation goes
    /// through the public store operations.
    fn apply_outcome(&self, item: &BacklogItem, analysis: AiAnalysis, counters: &mut Counters) {
        let classification = analysis.classification;
        let synergies = analysis.synergies.clone();

        if !self.backlog.apply_analysis(&item.id, analysis) {
            // Deleted or analyzed by someone else mid-run; skip quietly.
            warn!(item_id = %item.id, "could not attach analysis; skipping outcome");
            return;
        }

        match classification {
            Classification::ImmediateAction => {
                counters.items_approved += 1;
                self.backlog.set_status(&item.id, ItemStatus::Approved);
                let integrations = &self.config.integrations;
                if integrations.sync_with_action_plan && integrations.auto_create_tasks {
                    let mut new = NewTask::new(item.title.clone(), item.module, item.priority);
                    new.detail = item.description.clone();
                    new.ai_suggestion = Some(classification.reason().to_string());
                    new.tags = item.tags.clone();
                    new.tags.push("backlog-promotion".to_string());
                    if let Some(task_id) = self.plan.add_task_as(new, ActionOrigin::Automated) {
                        counters.tasks_created += 1;
                        self.backlog.link_task(&item.id, &task_id);
                    }
                }
                if self.config.board.auto_move_approved
                    && !self.config.board.require_approval_for_execution
                    && self.backlog.move_item_as(
                        &item.id,
                        BacklogColumn::InExecution,
                        "pipeline",
                        true,
                    )
                {
                    counters.items_moved += 1;
                }
            }
            Classification::NeedsValidation | Classification::FutureSuggestion => {
                if self
                    .backlog
                    .move_item_as(&item.id, BacklogColumn::InAnalysis, "pipeline", true)
                {
                    counters.items_moved += 1;
                }
            }
            Classification::Rejected => {
                counters.items_rejected += 1;
                self.backlog.set_status(&item.id, ItemStatus::Rejected);
                if self
                    .backlog
                    .move_item_as(&item.id, BacklogColumn::Archived, "pipeline", true)
                {
                    counters.items_moved += 1;
                }
            }
        }

        if self.config.integrations.connect_related_items {
            for synergy in &synergies {
                // Merge stays a reported recommendation; only Link mutates.
                if synergy.action == SynergyAction::Link {
                    self.backlog.link_task(&item.id, &synergy.task_id);
                }
            }
        }
    }
}
