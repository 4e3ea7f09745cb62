use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use tp_core::analysis::{AnalysisKind, FindingsGenerator, ModuleAnalysis};
use tp_core::ids;
use tp_core::types::{
    ActionOrigin, ActionOutcome, Bucket, ExecutionLogEntry, Module, ModuleName, NewTask, Task,
    TaskPatch, TaskPriority, TaskStatus, VersionDescriptor,
};

use crate::audit::BoundedLog;
use crate::bus::SnapshotBus;
use crate::export::{csv_record, ExportError};

/// Execution log retention; oldest entries are evicted first.
pub const EXECUTION_LOG_CAP: usize = 1_000;

const TASK_CSV_HEADER: &str =
    "id,title,module,priority,status,completion_percent,assignee,tags,estimated_hours,created_at,updated_at";

// ---------------------------------------------------------------------------
// Snapshot / filter / export options
// ---------------------------------------------------------------------------

/// Full store state pushed to subscribers on every mutation.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSnapshot {
    pub modules: Vec<Module>,
    pub version: VersionDescriptor,
    pub generated_at: DateTime<Utc>,
}

/// Criteria for `filter_tasks`; `None` fields match everything. Tag
/// filtering matches tasks sharing at least one of the given tags.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub modules: Option<Vec<ModuleName>>,
    pub statuses: Option<Vec<TaskStatus>>,
    pub priorities: Option<Vec<TaskPriority>>,
    pub assignees: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub has_ai_suggestion: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl TaskFilter {
    fn matches(&self, task: &Task) -> bool {
        if let Some(modules) = &self.modules {
            if !modules.contains(&task.module) {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if let Some(priorities) = &self.priorities {
            if !priorities.contains(&task.priority) {
                return false;
            }
        }
        if let Some(assignees) = &self.assignees {
            match &task.assignee {
                Some(assignee) if assignees.contains(assignee) => {}
                _ => return false,
            }
        }
        if let Some(tags) = &self.tags {
            if !task.tags.iter().any(|t| tags.contains(t)) {
                return false;
            }
        }
        if let Some(wants) = self.has_ai_suggestion {
            if task.ai_suggestion.is_some() != wants {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if task.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if task.created_at > before {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanExportFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone)]
pub struct PlanExportOptions {
    pub format: PlanExportFormat,
    pub include_log: bool,
    pub include_history: bool,
}

impl Default for PlanExportOptions {
    fn default() -> Self {
        Self {
            format: PlanExportFormat::Json,
            include_log: false,
            include_history: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ActionPlanStore
// ---------------------------------------------------------------------------

struct PlanState {
    modules: Vec<Module>,
    log: BoundedLog<ExecutionLogEntry>,
    version: VersionDescriptor,
    version_history: Vec<VersionDescriptor>,
    generator: FindingsGenerator,
}

/// Owns the per-module task buckets, metrics, execution log, and version
/// descriptor. Every mutating operation updates state under the lock,
/// recomputes the owning module's metrics, appends an execution-log
/// entry, and publishes the new snapshot to subscribers after the lock
/// is released.
pub struct ActionPlanStore {
    state: Mutex<PlanState>,
    bus: SnapshotBus<PlanSnapshot>,
}

impl ActionPlanStore {
    /// Store covering every known module.
    pub fn new() -> Self {
        Self::with_modules(ModuleName::all())
    }

    /// Store covering a subset of modules. `add_task` for a module not in
    /// the set is a silent no-op (the documented triage gap).
    pub fn with_modules(names: &[ModuleName]) -> Self {
        Self::build(names, FindingsGenerator::new())
    }

    /// Seeded findings generator, for deterministic tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::build(ModuleName::all(), FindingsGenerator::with_seed(seed))
    }

    fn build(names: &[ModuleName], generator: FindingsGenerator) -> Self {
        let modules: Vec<Module> = names.iter().map(|n| Module::new(*n)).collect();
        let version = VersionDescriptor {
            version: "1.0".to_string(),
            created_at: ids::now(),
            summary: "initial version".to_string(),
            actor: "system".to_string(),
            content_hash: content_hash(&modules),
        };
        Self {
            state: Mutex::new(PlanState {
                modules,
                log: BoundedLog::new(EXECUTION_LOG_CAP),
                version,
                version_history: Vec::new(),
                generator,
            }),
            bus: SnapshotBus::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlanState> {
        self.state.lock().expect("ActionPlanStore lock poisoned")
    }

    fn snapshot_locked(state: &PlanState) -> PlanSnapshot {
        PlanSnapshot {
            modules: state.modules.clone(),
            version: state.version.clone(),
            generated_at: ids::now(),
        }
    }

    // -- subscriptions ------------------------------------------------------

    /// Register a subscriber; it receives the full snapshot after every
    /// mutation from this point on. Drop the receiver to detach.
    pub fn subscribe(&self) -> flume::Receiver<PlanSnapshot> {
        self.bus.subscribe()
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        Self::snapshot_locked(&self.lock())
    }

    // -- task operations ----------------------------------------------------

    /// Create a task from a manual caller.
    pub fn add_task(&self, new: NewTask) -> Option<String> {
        self.add_task_as(new, ActionOrigin::Manual)
    }

    /// Create a task, attributing the execution-log entry to `origin`.
    /// Returns the assigned id, or `None` when the target module is not
    /// part of this store (a silent no-op).
    pub fn add_task_as(&self, new: NewTask, origin: ActionOrigin) -> Option<String> {
        let started = Instant::now();
        let module_name = new.module;
        let (snapshot, id) = {
            let mut state = self.lock();
            if !state.modules.iter().any(|m| m.name == module_name) {
                warn!(module = module_name.label(), "add_task ignored: unknown module");
                return None;
            }
            let task = new.into_task();
            let id = task.id.clone();
            let detail = format!("created '{}'", task.title);
            let bucket = task.status.bucket();
            if let Some(module) = state.modules.iter_mut().find(|m| m.name == module_name) {
                module.bucket_mut(bucket).push(task);
                module.recompute_metrics();
            }
            push_log(
                &mut state,
                "add_task",
                ActionOutcome::Success,
                origin,
                Some(module_name),
                started.elapsed().as_millis() as u64,
                detail,
            );
            (Self::snapshot_locked(&state), id)
        };
        self.bus.publish(snapshot);
        info!(task_id = %id, module = module_name.label(), "task added");
        Some(id)
    }

    /// Merge a partial update into a task, moving it between buckets when
    /// the status changed. Returns false when the id is unknown.
    pub fn update_task(&self, id: &str, patch: TaskPatch) -> bool {
        self.update_task_as(id, patch, ActionOrigin::Manual)
    }

    pub fn update_task_as(&self, id: &str, patch: TaskPatch, origin: ActionOrigin) -> bool {
        let started = Instant::now();
        let snapshot = {
            let mut state = self.lock();
            let Some((mi, bucket, ti)) = locate(&state.modules, id) else {
                warn!(task_id = id, "update_task: id not found");
                return false;
            };
            let mut task = state.modules[mi].bucket_mut(bucket).remove(ti);
            task.apply(patch);
            let module_name = task.module;
            let new_bucket = task.status.bucket();
            let detail = format!("updated '{}' ({})", task.title, task.status.as_str());
            if new_bucket == bucket {
                // Keep the task's position within its bucket.
                state.modules[mi].bucket_mut(bucket).insert(ti, task);
            } else {
                state.modules[mi].bucket_mut(new_bucket).push(task);
            }
            state.modules[mi].recompute_metrics();
            push_log(
                &mut state,
                "update_task",
                ActionOutcome::Success,
                origin,
                Some(module_name),
                started.elapsed().as_millis() as u64,
                detail,
            );
            Self::snapshot_locked(&state)
        };
        self.bus.publish(snapshot);
        true
    }

    /// Remove a task from whichever bucket holds it. Returns false when
    /// the id is unknown.
    pub fn delete_task(&self, id: &str) -> bool {
        self.delete_task_as(id, ActionOrigin::Manual)
    }

    pub fn delete_task_as(&self, id: &str, origin: ActionOrigin) -> bool {
        let started = Instant::now();
        let snapshot = {
            let mut state = self.lock();
            let Some((mi, bucket, ti)) = locate(&state.modules, id) else {
                warn!(task_id = id, "delete_task: id not found");
                return false;
            };
            let task = state.modules[mi].bucket_mut(bucket).remove(ti);
            state.modules[mi].recompute_metrics();
            push_log(
                &mut state,
                "delete_task",
                ActionOutcome::Success,
                origin,
                Some(task.module),
                started.elapsed().as_millis() as u64,
                format!("deleted '{}'", task.title),
            );
            Self::snapshot_locked(&state)
        };
        self.bus.publish(snapshot);
        true
    }

    /// Pure read; returns tasks in module order, pending → in-progress →
    /// done, insertion order within each bucket.
    pub fn filter_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let state = self.lock();
        state
            .modules
            .iter()
            .flat_map(|m| m.all_tasks())
            .filter(|t| filter.matches(t))
            .cloned()
            .collect()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        let state = self.lock();
        let (mi, bucket, ti) = locate(&state.modules, id)?;
        state.modules[mi].bucket(bucket).get(ti).cloned()
    }

    pub fn task_count(&self) -> usize {
        let state = self.lock();
        state.modules.iter().map(Module::task_count).sum()
    }

    // -- synthetic analysis -------------------------------------------------

    /// Run the synthetic module analysis over `scope`: generate findings,
    /// convert them into `ai-generated` tasks, refresh the analysis-owned
    /// module metrics, and log a summary entry.
    pub async fn run_ai_analysis(&self, kind: AnalysisKind, scope: Vec<ModuleName>) -> ModuleAnalysis {
        let started_at = ids::now();
        let started = Instant::now();

        // Stand-in for the provider round-trip; this is the await point a
        // real integration would time out / cancel at.
        tokio::task::yield_now().await;

        let findings = {
            let mut state = self.lock();
            state.generator.generate(kind, &scope)
        };

        let mut tasks_created = 0;
        for finding in &findings {
            for issue in &finding.issues {
                let mut new = NewTask::new(
                    format!("Fix: {issue}"),
                    finding.module,
                    TaskPriority::High,
                );
                new.tags = vec!["ai-generated".to_string(), "bug".to_string()];
                new.ai_suggestion = Some(issue.clone());
                if self.add_task_as(new, ActionOrigin::Automated).is_some() {
                    tasks_created += 1;
                }
            }
            for suggestion in &finding.suggestions {
                let mut new = NewTask::new(
                    suggestion.clone(),
                    finding.module,
                    TaskPriority::Medium,
                );
                new.tags = vec!["ai-generated".to_string()];
                new.ai_suggestion = Some(suggestion.clone());
                if self.add_task_as(new, ActionOrigin::Automated).is_some() {
                    tasks_created += 1;
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let snapshot = {
            let mut state = self.lock();
            for finding in &findings {
                if let Some(module) = state.modules.iter_mut().find(|m| m.name == finding.module) {
                    module.metrics.performance_score = finding.performance_score;
                    module.metrics.satisfaction_score = finding.satisfaction_score;
                    module.metrics.uptime = finding.uptime;
                    module.metrics.error_rate = finding.error_rate;
                    module.issues = finding.issues.clone();
                    module.improvements = finding.suggestions.clone();
                    module.last_updated = ids::now();
                }
            }
            push_log(
                &mut state,
                "run_ai_analysis",
                ActionOutcome::Success,
                ActionOrigin::Automated,
                None,
                elapsed_ms,
                format!(
                    "{} analysis over {} modules, {tasks_created} tasks created",
                    analysis_kind_str(kind),
                    findings.len()
                ),
            );
            Self::snapshot_locked(&state)
        };
        self.bus.publish(snapshot);

        info!(
            kind = analysis_kind_str(kind),
            modules = findings.len(),
            tasks_created,
            "ai analysis completed"
        );

        ModuleAnalysis {
            id: ids::new_id("analysis"),
            kind,
            scope,
            started_at,
            elapsed_ms,
            findings,
            tasks_created,
        }
    }

    // -- versioning ---------------------------------------------------------

    /// Archive the current version descriptor and install a new one with
    /// an incremented minor version and a fresh content hash.
    pub fn create_version(&self, summary: &str, actor: &str) -> VersionDescriptor {
        let started = Instant::now();
        let (snapshot, descriptor) = {
            let mut state = self.lock();
            let descriptor = VersionDescriptor {
                version: next_version(&state.version.version),
                created_at: ids::now(),
                summary: summary.to_string(),
                actor: actor.to_string(),
                content_hash: content_hash(&state.modules),
            };
            let previous = std::mem::replace(&mut state.version, descriptor.clone());
            state.version_history.push(previous);
            push_log(
                &mut state,
                "create_version",
                ActionOutcome::Success,
                ActionOrigin::Manual,
                None,
                started.elapsed().as_millis() as u64,
                format!("version {} by {actor}", descriptor.version),
            );
            (Self::snapshot_locked(&state), descriptor)
        };
        self.bus.publish(snapshot);
        descriptor
    }

    pub fn version(&self) -> VersionDescriptor {
        self.lock().version.clone()
    }

    pub fn version_history(&self) -> Vec<VersionDescriptor> {
        self.lock().version_history.clone()
    }

    // -- audit / export -----------------------------------------------------

    /// Execution log, oldest first.
    pub fn execution_log(&self) -> Vec<ExecutionLogEntry> {
        self.lock().log.to_vec()
    }

    /// Serialize the modules (plus, optionally, the execution log and
    /// version history) to JSON, or flatten every task to CSV.
    pub fn export(&self, opts: &PlanExportOptions) -> Result<String, ExportError> {
        let state = self.lock();
        match opts.format {
            PlanExportFormat::Json => {
                let mut root = serde_json::json!({
                    "generated_at": ids::now(),
                    "version": state.version,
                    "modules": state.modules,
                });
                if opts.include_log {
                    root["execution_log"] = serde_json::to_value(state.log.to_vec())?;
                }
                if opts.include_history {
                    root["version_history"] = serde_json::to_value(&state.version_history)?;
                }
                Ok(serde_json::to_string_pretty(&root)?)
            }
            PlanExportFormat::Csv => {
                let mut out = String::from(TASK_CSV_HEADER);
                for module in &state.modules {
                    for task in module.all_tasks() {
                        out.push('\n');
                        out.push_str(&task_csv_row(task));
                    }
                }
                Ok(out)
            }
        }
    }
}

impl Default for ActionPlanStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Linear scan across every module's three buckets.
fn locate(modules: &[Module], id: &str) -> Option<(usize, Bucket, usize)> {
    for (mi, module) in modules.iter().enumerate() {
        for bucket in [Bucket::Pending, Bucket::InProgress, Bucket::Done] {
            if let Some(ti) = module.bucket(bucket).iter().position(|t| t.id == id) {
                return Some((mi, bucket, ti));
            }
        }
    }
    None
}

fn push_log(
    state: &mut PlanState,
    action: &str,
    outcome: ActionOutcome,
    origin: ActionOrigin,
    module: Option<ModuleName>,
    elapsed_ms: u64,
    detail: String,
) {
    state.log.push(ExecutionLogEntry {
        id: ids::new_id("log"),
        timestamp: ids::now(),
        action: action.to_string(),
        outcome,
        origin,
        module,
        elapsed_ms,
        detail,
    });
}

fn next_version(current: &str) -> String {
    let mut parts = current.splitn(2, '.');
    let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    format!("{major}.{}", minor + 1)
}

/// Digest of the serialized modules; equality/change detection only.
fn content_hash(modules: &[Module]) -> String {
    let bytes = serde_json::to_vec(modules).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

fn analysis_kind_str(kind: AnalysisKind) -> &'static str {
    match kind {
        AnalysisKind::Full => "full",
        AnalysisKind::Performance => "performance",
        AnalysisKind::Bugs => "bugs",
        AnalysisKind::Suggestions => "suggestions",
    }
}

fn task_csv_row(task: &Task) -> String {
    let pct = task.completion_percent.to_string();
    let tags = task.tags.join(";");
    let hours = task
        .estimated_hours
        .map(|h| h.to_string())
        .unwrap_or_default();
    let created = task.created_at.to_rfc3339();
    let updated = task.updated_at.to_rfc3339();
    csv_record([
        task.id.as_str(),
        task.title.as_str(),
        task.module.label(),
        task.priority.as_str(),
        task.status.as_str(),
        pct.as_str(),
        task.assignee.as_deref().unwrap_or(""),
        tags.as_str(),
        hours.as_str(),
        created.as_str(),
        updated.as_str(),
    ])
}
