//! Action-plan store lifecycle tests: bucket invariants, metrics, the
//! execution log cap, versioning, and exports.

use tp_core::analysis::AnalysisKind;
use tp_core::types::*;
use tp_stores::action_plan::{
    ActionPlanStore, PlanExportFormat, PlanExportOptions, TaskFilter, EXECUTION_LOG_CAP,
};

// ===========================================================================
// Helpers
// ===========================================================================

fn new_task(title: &str, module: ModuleName, status: TaskStatus) -> NewTask {
    let mut new = NewTask::new(title, module, TaskPriority::Medium);
    new.status = status;
    new
}

/// Every task must sit in exactly the bucket its status maps to.
fn assert_bucket_invariant(store: &ActionPlanStore) {
    for module in store.snapshot().modules {
        for task in &module.pending {
            assert_eq!(task.status.bucket(), Bucket::Pending, "task {}", task.id);
        }
        for task in &module.in_progress {
            assert_eq!(task.status.bucket(), Bucket::InProgress, "task {}", task.id);
        }
        for task in &module.done {
            assert_eq!(task.status.bucket(), Bucket::Done, "task {}", task.id);
        }
    }
}

// ===========================================================================
// Task CRUD
// ===========================================================================

#[test]
fn add_task_lands_in_the_status_bucket() {
    let store = ActionPlanStore::new();
    store
        .add_task(new_task("a", ModuleName::Crm, TaskStatus::Pending))
        .unwrap();
    store
        .add_task(new_task("b", ModuleName::Crm, TaskStatus::InProgress))
        .unwrap();
    store
        .add_task(new_task("c", ModuleName::Crm, TaskStatus::Done))
        .unwrap();
    // Error status maps into the pending bucket.
    store
        .add_task(new_task("d", ModuleName::Crm, TaskStatus::Error))
        .unwrap();

    let snapshot = store.snapshot();
    let crm = snapshot
        .modules
        .iter()
        .find(|m| m.name == ModuleName::Crm)
        .unwrap();
    assert_eq!(crm.pending.len(), 2);
    assert_eq!(crm.in_progress.len(), 1);
    assert_eq!(crm.done.len(), 1);
    assert_bucket_invariant(&store);
}

#[test]
fn add_task_for_unknown_module_is_a_silent_noop() {
    let store = ActionPlanStore::with_modules(&[ModuleName::Crm]);
    let id = store.add_task(new_task("orphan", ModuleName::Billing, TaskStatus::Pending));
    assert!(id.is_none());
    assert_eq!(store.task_count(), 0);
    // No audit entry for an operation that mutated nothing.
    assert!(store.execution_log().is_empty());
}

#[test]
fn update_task_moves_between_buckets_on_status_change() {
    let store = ActionPlanStore::new();
    let id = store
        .add_task(new_task("mover", ModuleName::Billing, TaskStatus::Pending))
        .unwrap();

    let ok = store.update_task(
        &id,
        TaskPatch {
            status: Some(TaskStatus::InProgress),
            ..TaskPatch::default()
        },
    );
    assert!(ok);
    assert_bucket_invariant(&store);

    let task = store.task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);

    // Cancelling sends it back to the pending bucket.
    store.update_task(
        &id,
        TaskPatch {
            status: Some(TaskStatus::Cancelled),
            ..TaskPatch::default()
        },
    );
    assert_bucket_invariant(&store);
    let snapshot = store.snapshot();
    let billing = snapshot
        .modules
        .iter()
        .find(|m| m.name == ModuleName::Billing)
        .unwrap();
    assert_eq!(billing.pending.len(), 1);
    assert!(billing.in_progress.is_empty());
}

#[test]
fn update_unknown_id_returns_false() {
    let store = ActionPlanStore::new();
    assert!(!store.update_task("task-missing", TaskPatch::default()));
    assert!(!store.delete_task("task-missing"));
}

#[test]
fn delete_task_removes_and_recomputes_metrics() {
    let store = ActionPlanStore::new();
    let id = store
        .add_task(new_task("short lived", ModuleName::Crm, TaskStatus::Done))
        .unwrap();
    assert!(store.delete_task(&id));
    assert_eq!(store.task_count(), 0);

    let snapshot = store.snapshot();
    let crm = snapshot
        .modules
        .iter()
        .find(|m| m.name == ModuleName::Crm)
        .unwrap();
    assert_eq!(crm.metrics.total_tasks, 0);
    assert_eq!(crm.metrics.completion_rate, 0.0);
}

#[test]
fn metrics_and_health_follow_completion_rate() {
    let store = ActionPlanStore::new();
    for i in 0..9 {
        store
            .add_task(new_task(&format!("done-{i}"), ModuleName::Analytics, TaskStatus::Done))
            .unwrap();
    }
    store
        .add_task(new_task("open", ModuleName::Analytics, TaskStatus::Pending))
        .unwrap();

    let snapshot = store.snapshot();
    let analytics = snapshot
        .modules
        .iter()
        .find(|m| m.name == ModuleName::Analytics)
        .unwrap();
    assert_eq!(analytics.metrics.completed_tasks, 9);
    assert!((analytics.metrics.completion_rate - 90.0).abs() < 1e-9);
    // 90 is not > 90, so this is Good, not Excellent.
    assert_eq!(analytics.health(), ModuleHealth::Good);
}

// ===========================================================================
// Filtering
// ===========================================================================

#[test]
fn filter_by_module_status_priority_and_tags() {
    let store = ActionPlanStore::new();
    let mut a = NewTask::new("tagged critical", ModuleName::Crm, TaskPriority::Critical);
    a.tags = vec!["bug".to_string()];
    store.add_task(a).unwrap();
    let mut b = NewTask::new("assigned medium", ModuleName::Billing, TaskPriority::Medium);
    b.assignee = Some("dana".to_string());
    b.status = TaskStatus::InProgress;
    store.add_task(b).unwrap();

    let by_module = store.filter_tasks(&TaskFilter {
        modules: Some(vec![ModuleName::Crm]),
        ..TaskFilter::default()
    });
    assert_eq!(by_module.len(), 1);
    assert_eq!(by_module[0].title, "tagged critical");

    let by_status = store.filter_tasks(&TaskFilter {
        statuses: Some(vec![TaskStatus::InProgress]),
        ..TaskFilter::default()
    });
    assert_eq!(by_status.len(), 1);

    let by_priority = store.filter_tasks(&TaskFilter {
        priorities: Some(vec![TaskPriority::Critical]),
        ..TaskFilter::default()
    });
    assert_eq!(by_priority.len(), 1);

    let by_assignee = store.filter_tasks(&TaskFilter {
        assignees: Some(vec!["dana".to_string()]),
        ..TaskFilter::default()
    });
    assert_eq!(by_assignee.len(), 1);

    let by_tag = store.filter_tasks(&TaskFilter {
        tags: Some(vec!["bug".to_string()]),
        ..TaskFilter::default()
    });
    assert_eq!(by_tag.len(), 1);
}

#[test]
fn filter_is_idempotent_against_an_unmodified_store() {
    let store = ActionPlanStore::new();
    for i in 0..5 {
        store
            .add_task(new_task(&format!("t{i}"), ModuleName::Platform, TaskStatus::Pending))
            .unwrap();
    }
    let filter = TaskFilter {
        modules: Some(vec![ModuleName::Platform]),
        ..TaskFilter::default()
    };
    let first = store.filter_tasks(&filter);
    let second = store.filter_tasks(&filter);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.id, b.id);
    }
}

// ===========================================================================
// Execution log (scenario: 1,001 operations)
// ===========================================================================

#[test]
fn execution_log_caps_at_one_thousand_with_fifo_eviction() {
    let store = ActionPlanStore::new();
    for i in 0..=EXECUTION_LOG_CAP {
        store
            .add_task(new_task(&format!("op-{i:04}"), ModuleName::Crm, TaskStatus::Pending))
            .unwrap();
    }

    let log = store.execution_log();
    assert_eq!(log.len(), EXECUTION_LOG_CAP);
    // The very first entry was evicted; the second op now leads.
    assert!(!log.iter().any(|e| e.detail == "created 'op-0000'"));
    assert_eq!(log[0].detail, "created 'op-0001'");
    assert_eq!(log.last().unwrap().detail, "created 'op-1000'");
}

#[test]
fn log_entries_carry_origin_and_module() {
    let store = ActionPlanStore::new();
    store
        .add_task_as(
            new_task("automated", ModuleName::Platform, TaskStatus::Pending),
            ActionOrigin::Automated,
        )
        .unwrap();

    let log = store.execution_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, "add_task");
    assert_eq!(log[0].outcome, ActionOutcome::Success);
    assert_eq!(log[0].origin, ActionOrigin::Automated);
    assert_eq!(log[0].module, Some(ModuleName::Platform));
}

// ===========================================================================
// Subscriptions
// ===========================================================================

#[test]
fn subscribers_receive_a_snapshot_per_mutation() {
    let store = ActionPlanStore::new();
    let rx = store.subscribe();

    store
        .add_task(new_task("first", ModuleName::Crm, TaskStatus::Pending))
        .unwrap();
    store
        .add_task(new_task("second", ModuleName::Crm, TaskStatus::Pending))
        .unwrap();

    let snap1 = rx.try_recv().expect("first snapshot");
    let snap2 = rx.try_recv().expect("second snapshot");
    assert!(rx.try_recv().is_err());

    let count = |snap: &tp_stores::action_plan::PlanSnapshot| {
        snap.modules.iter().map(|m| m.task_count()).sum::<usize>()
    };
    assert_eq!(count(&snap1), 1);
    assert_eq!(count(&snap2), 2);
}

#[test]
fn detached_subscriber_gets_nothing_further() {
    let store = ActionPlanStore::new();
    let rx = store.subscribe();
    drop(rx);
    // Publishing after detach must not panic or deliver.
    store
        .add_task(new_task("lonely", ModuleName::Crm, TaskStatus::Pending))
        .unwrap();
}

// ===========================================================================
// Versioning
// ===========================================================================

#[test]
fn create_version_archives_and_bumps_minor() {
    let store = ActionPlanStore::new();
    assert_eq!(store.version().version, "1.0");

    let v1 = store.create_version("first cut", "alice");
    assert_eq!(v1.version, "1.1");
    assert_eq!(store.version().version, "1.1");

    let history = store.version_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version, "1.0");

    let v2 = store.create_version("second cut", "bob");
    assert_eq!(v2.version, "1.2");
    assert_eq!(store.version_history().len(), 2);
}

#[test]
fn content_hash_changes_when_modules_change() {
    let store = ActionPlanStore::new();
    let v1 = store.create_version("baseline", "alice");
    store
        .add_task(new_task("hash changer", ModuleName::Crm, TaskStatus::Pending))
        .unwrap();
    let v2 = store.create_version("after change", "alice");
    assert_ne!(v1.content_hash, v2.content_hash);
}

// ===========================================================================
// Synthetic analysis
// ===========================================================================

#[tokio::test]
async fn run_ai_analysis_creates_tagged_tasks_and_updates_metrics() {
    let store = ActionPlanStore::with_seed(11);
    let result = store
        .run_ai_analysis(AnalysisKind::Full, vec![ModuleName::Billing])
        .await;

    assert_eq!(result.findings.len(), 1);
    assert!(result.tasks_created > 0);
    assert_eq!(store.task_count(), result.tasks_created);

    let generated = store.filter_tasks(&TaskFilter {
        tags: Some(vec!["ai-generated".to_string()]),
        ..TaskFilter::default()
    });
    assert_eq!(generated.len(), result.tasks_created);
    assert!(generated.iter().all(|t| t.ai_suggestion.is_some()));

    let snapshot = store.snapshot();
    let billing = snapshot
        .modules
        .iter()
        .find(|m| m.name == ModuleName::Billing)
        .unwrap();
    assert!(billing.metrics.performance_score >= 60.0);
    assert!(!billing.issues.is_empty());
    assert!(!billing.improvements.is_empty());

    // The summary entry is logged after the per-task entries.
    let log = store.execution_log();
    assert_eq!(log.last().unwrap().action, "run_ai_analysis");
    assert_bucket_invariant(&store);
}

// ===========================================================================
// Export
// ===========================================================================

#[test]
fn json_export_optionally_includes_log_and_history() {
    let store = ActionPlanStore::new();
    store
        .add_task(new_task("exported", ModuleName::Crm, TaskStatus::Pending))
        .unwrap();
    store.create_version("v", "alice");

    let bare = store
        .export(&PlanExportOptions::default())
        .expect("json export");
    let parsed: serde_json::Value = serde_json::from_str(&bare).unwrap();
    assert!(parsed.get("modules").is_some());
    assert!(parsed.get("execution_log").is_none());

    let full = store
        .export(&PlanExportOptions {
            format: PlanExportFormat::Json,
            include_log: true,
            include_history: true,
        })
        .expect("json export with extras");
    let parsed: serde_json::Value = serde_json::from_str(&full).unwrap();
    assert!(parsed["execution_log"].as_array().unwrap().len() >= 2);
    assert_eq!(parsed["version_history"].as_array().unwrap().len(), 1);
}

#[test]
fn csv_export_flattens_every_task() {
    let store = ActionPlanStore::new();
    store
        .add_task(new_task("one", ModuleName::Crm, TaskStatus::Pending))
        .unwrap();
    store
        .add_task(new_task("two, with comma", ModuleName::Billing, TaskStatus::Done))
        .unwrap();

    let csv = store
        .export(&PlanExportOptions {
            format: PlanExportFormat::Csv,
            include_log: false,
            include_history: false,
        })
        .expect("csv export");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3); // header + 2 tasks
    assert!(lines[0].starts_with("id,title,module"));
    assert!(csv.contains("\"two, with comma\""));
}
