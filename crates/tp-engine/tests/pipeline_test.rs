//! End-to-end classification pipeline tests: triage outcomes, the
//! reentrancy guard, per-item failure isolation, and timeouts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tp_core::config::EngineConfig;
use tp_core::types::*;
use tp_engine::analyzer::{AnalyzerError, HeuristicAnalyzer, ItemAnalyzer};
use tp_engine::pipeline::{ClassificationPipeline, PipelineError, PipelineState};
use tp_stores::action_plan::{ActionPlanStore, TaskFilter};
use tp_stores::backlog::BacklogStore;

// ===========================================================================
// Helpers
// ===========================================================================

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.pipeline.batch_size = 10;
    config.pipeline.timeout_per_item_secs = 5;
    config.pipeline.retry_attempts = 1;
    config
}

fn stores(config: &EngineConfig) -> (Arc<BacklogStore>, Arc<ActionPlanStore>) {
    (
        Arc::new(BacklogStore::new(config.board.clone())),
        Arc::new(ActionPlanStore::new()),
    )
}

fn pipeline_with(
    config: EngineConfig,
    analyzer: Arc<dyn ItemAnalyzer>,
) -> (
    Arc<ClassificationPipeline>,
    Arc<BacklogStore>,
    Arc<ActionPlanStore>,
) {
    let (backlog, plan) = stores(&config);
    let pipeline = Arc::new(ClassificationPipeline::new(
        backlog.clone(),
        plan.clone(),
        analyzer,
        config,
    ));
    (pipeline, backlog, plan)
}

fn flagship_item() -> NewItem {
    let mut new = NewItem::new(
        "Automated clause review",
        BacklogCategory::LegalTech,
        ModuleName::Documents,
        TaskPriority::Critical,
    );
    new.description = "long description ".repeat(20);
    new.checklist = vec![ChecklistEntry::new("collect precedents")];
    new
}

fn weak_item() -> NewItem {
    NewItem::new(
        "minor tweak",
        BacklogCategory::Infrastructure,
        ModuleName::Platform,
        TaskPriority::Low,
    )
}

// -- Test analyzers ---------------------------------------------------------

/// Fails items whose title contains "bad"; otherwise delegates.
struct FlakyAnalyzer {
    inner: HeuristicAnalyzer,
}

#[async_trait]
impl ItemAnalyzer for FlakyAnalyzer {
    async fn analyze(
        &self,
        item: &BacklogItem,
        tasks: &[Task],
    ) -> Result<AiAnalysis, AnalyzerError> {
        if item.title.contains("bad") {
            return Err(AnalyzerError::Item("synthetic failure".to_string()));
        }
        self.inner.analyze(item, tasks).await
    }
}

/// Never completes within any reasonable timeout.
struct SlowAnalyzer;

#[async_trait]
impl ItemAnalyzer for SlowAnalyzer {
    async fn analyze(
        &self,
        _item: &BacklogItem,
        _tasks: &[Task],
    ) -> Result<AiAnalysis, AnalyzerError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(AnalyzerError::Item("unreachable".to_string()))
    }
}

/// Simulates an unusable provider; aborts the run.
struct FatalAnalyzer;

#[async_trait]
impl ItemAnalyzer for FatalAnalyzer {
    async fn analyze(
        &self,
        _item: &BacklogItem,
        _tasks: &[Task],
    ) -> Result<AiAnalysis, AnalyzerError> {
        Err(AnalyzerError::Fatal("provider down".to_string()))
    }
}

// ===========================================================================
// Triage outcomes
// ===========================================================================

#[tokio::test]
async fn high_value_item_is_approved_promoted_and_moved() {
    let (pipeline, backlog, plan) =
        pipeline_with(test_config(), Arc::new(HeuristicAnalyzer::with_seed(42)));
    let id = backlog.create_item(flagship_item()).unwrap();

    let record = pipeline.run_batch().await.expect("batch should succeed");
    assert_eq!(record.items_processed, 1);
    assert_eq!(record.items_approved, 1);
    assert_eq!(record.tasks_created, 1);
    assert!(record.avg_confidence >= 70.0);
    assert_eq!(pipeline.state(), PipelineState::Idle);

    let item = backlog.item(&id).unwrap();
    let analysis = item.analysis.as_ref().expect("analysis attached");
    // Floor 125 with ±10 jitter: always the top band.
    assert!(matches!(
        analysis.classification,
        Classification::ImmediateAction | Classification::NeedsValidation
    ));
    assert_eq!(item.status, ItemStatus::Approved);
    assert_eq!(item.column, BacklogColumn::InExecution);
    assert!(item
        .movement_history
        .iter()
        .any(|m| m.automatic && m.to == BacklogColumn::InExecution));

    // The promoted task exists and is linked back.
    assert_eq!(item.linked_task_ids.len(), 1);
    let task = plan.task(&item.linked_task_ids[0]).expect("linked task");
    assert_eq!(task.module, ModuleName::Documents);
    assert!(task.tags.iter().any(|t| t == "backlog-promotion"));
}

#[tokio::test]
async fn weak_item_is_rejected_and_archived() {
    // Low priority + low-weight category floors at 55; jitter lands the
    // score in [45, 65], straddling the rejected/future boundary. Assert
    // the column matches whichever verdict the analysis recorded.
    let (pipeline, backlog, _plan) =
        pipeline_with(test_config(), Arc::new(HeuristicAnalyzer::with_seed(7)));
    let id = backlog.create_item(weak_item()).unwrap();

    pipeline.run_batch().await.expect("batch should succeed");

    let item = backlog.item(&id).unwrap();
    let analysis = item.analysis.as_ref().expect("analysis attached");
    match analysis.classification {
        Classification::Rejected => {
            assert_eq!(item.status, ItemStatus::Rejected);
            assert_eq!(item.column, BacklogColumn::Archived);
        }
        Classification::FutureSuggestion | Classification::NeedsValidation => {
            assert_eq!(item.column, BacklogColumn::InAnalysis);
        }
        Classification::ImmediateAction => {
            panic!("a floor-55 item can never reach the top band");
        }
    }
}

#[tokio::test]
async fn future_suggestion_moves_to_in_analysis() {
    // Medium priority + analytics: floor 50+10+10 = 70 → with jitter in
    // [60, 80]; never rejected, never guaranteed immediate. When the
    // jitter lands below 80 the item must sit in InAnalysis.
    let (pipeline, backlog, _plan) =
        pipeline_with(test_config(), Arc::new(HeuristicAnalyzer::with_seed(3)));
    let mut new = NewItem::new(
        "dashboard polish",
        BacklogCategory::Analytics,
        ModuleName::Analytics,
        TaskPriority::Medium,
    );
    new.description = String::new();
    let id = backlog.create_item(new).unwrap();

    pipeline.run_batch().await.expect("batch should succeed");

    let item = backlog.item(&id).unwrap();
    let analysis = item.analysis.as_ref().expect("analysis attached");
    match analysis.classification {
        Classification::ImmediateAction => assert_eq!(item.column, BacklogColumn::InExecution),
        _ => {
            assert!(analysis.classification.future_suggestion());
            assert_eq!(item.column, BacklogColumn::InAnalysis);
        }
    }
}

#[tokio::test]
async fn synergy_link_appends_related_task() {
    let (pipeline, backlog, plan) =
        pipeline_with(test_config(), Arc::new(HeuristicAnalyzer::with_seed(5)));

    // An existing task that complements the incoming item: same module,
    // adjacent priority, 3 of 4 title words shared.
    let existing = plan
        .add_task(NewTask::new(
            "migrate billing exports nightly",
            ModuleName::Billing,
            TaskPriority::High,
        ))
        .unwrap();

    let mut new = NewItem::new(
        "migrate billing exports hourly",
        BacklogCategory::Integration,
        ModuleName::Billing,
        TaskPriority::Critical,
    );
    new.description = "d".repeat(150);
    let id = backlog.create_item(new).unwrap();

    pipeline.run_batch().await.expect("batch should succeed");

    let item = backlog.item(&id).unwrap();
    let analysis = item.analysis.as_ref().expect("analysis attached");
    assert!(
        analysis
            .synergies
            .iter()
            .any(|s| s.task_id == existing && s.action == SynergyAction::Link),
        "expected a link synergy against the existing task"
    );
    assert!(item.linked_task_ids.iter().any(|t| *t == existing));
}

// ===========================================================================
// Guard rails
// ===========================================================================

#[tokio::test]
async fn overlapping_runs_are_rejected_not_queued() {
    let mut config = test_config();
    config.pipeline.timeout_per_item_secs = 60;
    config.pipeline.retry_attempts = 0;
    let (pipeline, backlog, _plan) = pipeline_with(config, Arc::new(SlowAnalyzer));
    backlog.create_item(flagship_item()).unwrap();

    let runner = pipeline.clone();
    let first = tokio::spawn(async move { runner.run_batch().await });

    // Give the first run time to take the guard.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.state(), PipelineState::Processing);
    let second = pipeline.run_batch().await;
    assert!(matches!(second, Err(PipelineError::AlreadyRunning)));

    first.abort();
    let _ = first.await;
}

#[tokio::test]
async fn per_item_failure_does_not_abort_the_batch() {
    let (pipeline, backlog, _plan) = pipeline_with(
        test_config(),
        Arc::new(FlakyAnalyzer {
            inner: HeuristicAnalyzer::with_seed(1),
        }),
    );
    let bad = backlog
        .create_item(NewItem::new(
            "bad idea",
            BacklogCategory::Ux,
            ModuleName::Crm,
            TaskPriority::Low,
        ))
        .unwrap();
    let good = backlog.create_item(flagship_item()).unwrap();

    let record = pipeline.run_batch().await.expect("run completes");
    assert_eq!(record.items_processed, 2);
    assert_eq!(pipeline.state(), PipelineState::Idle);

    // The failed item is untouched and stays eligible for the next run.
    let bad_item = backlog.item(&bad).unwrap();
    assert!(bad_item.analysis.is_none());
    assert_eq!(bad_item.column, BacklogColumn::Ideas);

    // The later item in the same run was processed normally.
    let good_item = backlog.item(&good).unwrap();
    assert!(good_item.analysis.is_some());
}

#[tokio::test]
async fn slow_analysis_times_out_per_item() {
    let mut config = test_config();
    config.pipeline.timeout_per_item_secs = 0;
    config.pipeline.retry_attempts = 1;
    let (pipeline, backlog, _plan) = pipeline_with(config, Arc::new(SlowAnalyzer));
    let id = backlog.create_item(flagship_item()).unwrap();

    let record = pipeline.run_batch().await.expect("run completes");
    assert_eq!(record.items_processed, 1);
    assert_eq!(record.avg_confidence, 0.0);
    assert!(backlog.item(&id).unwrap().analysis.is_none());
}

#[tokio::test]
async fn fatal_analyzer_sets_error_state_but_next_run_proceeds() {
    let (pipeline, backlog, _plan) = pipeline_with(test_config(), Arc::new(FatalAnalyzer));
    backlog.create_item(flagship_item()).unwrap();

    let result = pipeline.run_batch().await;
    assert!(matches!(result, Err(PipelineError::RunFailed(_))));
    assert_eq!(pipeline.state(), PipelineState::Error);
    // The failed run is still recorded and the next run scheduled.
    assert_eq!(pipeline.history().len(), 1);
    assert!(pipeline.next_run_at().is_some());

    // The next run proceeds from Error state.
    let again = pipeline.run_batch().await;
    assert!(matches!(again, Err(PipelineError::RunFailed(_))));
    assert_eq!(pipeline.history().len(), 2);
}

// ===========================================================================
// Processing history / scheduling
// ===========================================================================

#[tokio::test]
async fn every_run_records_history_and_schedules_the_next() {
    let (pipeline, backlog, _plan) =
        pipeline_with(test_config(), Arc::new(HeuristicAnalyzer::with_seed(2)));
    backlog.create_item(flagship_item()).unwrap();

    assert!(pipeline.next_run_at().is_none());
    let before = tp_core::ids::now();
    pipeline.run_batch().await.expect("first run");
    pipeline.run_batch().await.expect("empty second run");

    let history = pipeline.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].items_processed, 1);
    assert_eq!(history[1].items_processed, 0);

    let next = pipeline.next_run_at().expect("next run scheduled");
    assert!(next > before);
}

#[tokio::test]
async fn batch_size_caps_the_selection() {
    let mut config = test_config();
    config.pipeline.batch_size = 2;
    let (pipeline, backlog, _plan) =
        pipeline_with(config, Arc::new(HeuristicAnalyzer::with_seed(8)));
    for i in 0..5 {
        let mut new = weak_item();
        new.title = format!("idea {i}");
        backlog.create_item(new).unwrap();
    }

    let record = pipeline.run_batch().await.expect("run completes");
    assert_eq!(record.items_processed, 2);
    assert_eq!(
        backlog
            .filter_items(&tp_stores::backlog::ItemFilter {
                has_analysis: Some(true),
                ..Default::default()
            })
            .len(),
        2
    );
}

// ===========================================================================
// Configuration toggles
// ===========================================================================

#[tokio::test]
async fn disabled_task_creation_still_moves_items() {
    let mut config = test_config();
    config.integrations.auto_create_tasks = false;
    let (pipeline, backlog, plan) =
        pipeline_with(config, Arc::new(HeuristicAnalyzer::with_seed(6)));
    let id = backlog.create_item(flagship_item()).unwrap();

    let record = pipeline.run_batch().await.expect("run completes");
    assert_eq!(record.tasks_created, 0);
    assert_eq!(plan.task_count(), 0);

    let item = backlog.item(&id).unwrap();
    assert!(item.linked_task_ids.is_empty());
    assert_eq!(item.column, BacklogColumn::InExecution);
}

#[tokio::test]
async fn approval_requirement_blocks_the_auto_move() {
    let mut config = test_config();
    config.board.require_approval_for_execution = true;
    let (pipeline, backlog, _plan) =
        pipeline_with(config, Arc::new(HeuristicAnalyzer::with_seed(9)));
    let id = backlog.create_item(flagship_item()).unwrap();

    pipeline.run_batch().await.expect("run completes");

    let item = backlog.item(&id).unwrap();
    assert_eq!(item.status, ItemStatus::Approved);
    // Approved but held for a human to move it.
    assert_eq!(item.column, BacklogColumn::Ideas);
}

#[tokio::test]
async fn sync_disabled_skips_the_cross_join_and_promotion() {
    let mut config = test_config();
    config.integrations.sync_with_action_plan = false;
    let (pipeline, backlog, plan) =
        pipeline_with(config, Arc::new(HeuristicAnalyzer::with_seed(10)));
    plan.add_task(NewTask::new(
        "Automated clause review",
        ModuleName::Documents,
        TaskPriority::Critical,
    ))
    .unwrap();
    let id = backlog.create_item(flagship_item()).unwrap();

    pipeline.run_batch().await.expect("run completes");

    let item = backlog.item(&id).unwrap();
    let analysis = item.analysis.as_ref().expect("analysis attached");
    assert!(analysis.synergies.is_empty());
    assert!(item.linked_task_ids.is_empty());
    // Only the seeded task exists; nothing was promoted.
    assert_eq!(plan.filter_tasks(&TaskFilter::default()).len(), 1);
}
