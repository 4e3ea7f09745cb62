use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

// ---------------------------------------------------------------------------
// TaskStatus / Bucket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Error,
    Cancelled,
}

/// The three physical task buckets of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Pending,
    InProgress,
    Done,
}

impl TaskStatus {
    /// The bucket a task with this status must live in. Error and
    /// Cancelled land back in the pending bucket ("needs re-triage").
    pub fn bucket(&self) -> Bucket {
        match self {
            TaskStatus::Pending | TaskStatus::Error | TaskStatus::Cancelled => Bucket::Pending,
            TaskStatus::InProgress => Bucket::InProgress,
            TaskStatus::Done => Bucket::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskPriority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    /// Numeric rank used by the similarity detector (low=1 … critical=4).
    pub fn rank(&self) -> u8 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Medium => 2,
            TaskPriority::High => 3,
            TaskPriority::Critical => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        }
    }
}

// ---------------------------------------------------------------------------
// ModuleName
// ---------------------------------------------------------------------------

/// The fixed set of host-product functional areas that own tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleName {
    Crm,
    Billing,
    Documents,
    Automation,
    Analytics,
    Platform,
}

impl ModuleName {
    pub fn all() -> &'static [ModuleName] {
        &[
            ModuleName::Crm,
            ModuleName::Billing,
            ModuleName::Documents,
            ModuleName::Automation,
            ModuleName::Analytics,
            ModuleName::Platform,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModuleName::Crm => "CRM",
            ModuleName::Billing => "Billing",
            ModuleName::Documents => "Documents",
            ModuleName::Automation => "Automation",
            ModuleName::Analytics => "Analytics",
            ModuleName::Platform => "Platform",
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub module: ModuleName,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub detail: String,
    pub ai_suggestion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completion_percent: u8,
    pub assignee: Option<String>,
    pub tags: Vec<String>,
    pub estimated_hours: Option<f32>,
}

/// Input for creating a task; the store assigns the id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub module: ModuleName,
    pub priority: TaskPriority,
    #[serde(default = "default_new_task_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub ai_suggestion: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub estimated_hours: Option<f32>,
}

fn default_new_task_status() -> TaskStatus {
    TaskStatus::Pending
}

impl NewTask {
    pub fn new(title: impl Into<String>, module: ModuleName, priority: TaskPriority) -> Self {
        Self {
            title: title.into(),
            module,
            priority,
            status: TaskStatus::Pending,
            detail: String::new(),
            ai_suggestion: None,
            assignee: None,
            tags: Vec::new(),
            estimated_hours: None,
        }
    }

    /// Materialize the task with a fresh id and timestamps.
    pub fn into_task(self) -> Task {
        let now = ids::now();
        Task {
            id: ids::new_id("task"),
            title: self.title,
            module: self.module,
            priority: self.priority,
            status: self.status,
            detail: self.detail,
            ai_suggestion: self.ai_suggestion,
            created_at: now,
            updated_at: now,
            completion_percent: 0,
            assignee: self.assignee,
            tags: self.tags,
            estimated_hours: self.estimated_hours,
        }
    }
}

/// Partial update for a task; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub detail: Option<String>,
    pub ai_suggestion: Option<String>,
    pub completion_percent: Option<u8>,
    pub assignee: Option<String>,
    pub tags: Option<Vec<String>>,
    pub estimated_hours: Option<f32>,
}

impl Task {
    /// Merge a patch into this task and stamp `updated_at`.
    pub fn apply(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(detail) = patch.detail {
            self.detail = detail;
        }
        if let Some(suggestion) = patch.ai_suggestion {
            self.ai_suggestion = Some(suggestion);
        }
        if let Some(pct) = patch.completion_percent {
            self.completion_percent = pct.min(100);
        }
        if let Some(assignee) = patch.assignee {
            self.assignee = Some(assignee);
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(hours) = patch.estimated_hours {
            self.estimated_hours = Some(hours);
        }
        self.updated_at = ids::now();
    }
}

// ---------------------------------------------------------------------------
// Module metrics / health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleMetrics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    /// Percentage in [0, 100].
    pub completion_rate: f64,
    pub active_bugs: usize,
    pub performance_score: f64,
    pub satisfaction_score: f64,
    pub uptime: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleHealth {
    Excellent,
    Good,
    Fair,
    Critical,
}

impl ModuleHealth {
    /// Health is a pure function of the completion rate; no other metric
    /// may influence it.
    pub fn from_completion_rate(rate: f64) -> Self {
        if rate > 90.0 {
            ModuleHealth::Excellent
        } else if rate > 75.0 {
            ModuleHealth::Good
        } else if rate > 50.0 {
            ModuleHealth::Fair
        } else {
            ModuleHealth::Critical
        }
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: ModuleName,
    pub pending: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
    pub issues: Vec<String>,
    pub improvements: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub metrics: ModuleMetrics,
}

impl Module {
    pub fn new(name: ModuleName) -> Self {
        Self {
            name,
            pending: Vec::new(),
            in_progress: Vec::new(),
            done: Vec::new(),
            issues: Vec::new(),
            improvements: Vec::new(),
            last_updated: ids::now(),
            metrics: ModuleMetrics::default(),
        }
    }

    pub fn bucket(&self, bucket: Bucket) -> &Vec<Task> {
        match bucket {
            Bucket::Pending => &self.pending,
            Bucket::InProgress => &self.in_progress,
            Bucket::Done => &self.done,
        }
    }

    pub fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<Task> {
        match bucket {
            Bucket::Pending => &mut self.pending,
            Bucket::InProgress => &mut self.in_progress,
            Bucket::Done => &mut self.done,
        }
    }

    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.pending
            .iter()
            .chain(self.in_progress.iter())
            .chain(self.done.iter())
    }

    pub fn task_count(&self) -> usize {
        self.pending.len() + self.in_progress.len() + self.done.len()
    }

    pub fn health(&self) -> ModuleHealth {
        ModuleHealth::from_completion_rate(self.metrics.completion_rate)
    }

    /// Recompute the task-derived metrics. The analysis-derived scores
    /// (performance, satisfaction, uptime, error rate) are owned by
    /// `run_ai_analysis` and left untouched here.
    pub fn recompute_metrics(&mut self) {
        let total = self.task_count();
        let completed = self.done.len();
        self.metrics.total_tasks = total;
        self.metrics.completed_tasks = completed;
        self.metrics.completion_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        self.metrics.active_bugs = self
            .pending
            .iter()
            .chain(self.in_progress.iter())
            .filter(|t| t.tags.iter().any(|tag| tag == "bug"))
            .count();
        self.last_updated = ids::now();
    }
}

// ---------------------------------------------------------------------------
// BacklogColumn
// ---------------------------------------------------------------------------

/// Kanban lanes, in board order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogColumn {
    Ideas,
    InAnalysis,
    InExecution,
    Done,
    Archived,
}

impl BacklogColumn {
    pub fn ordered() -> &'static [BacklogColumn] {
        &[
            BacklogColumn::Ideas,
            BacklogColumn::InAnalysis,
            BacklogColumn::InExecution,
            BacklogColumn::Done,
            BacklogColumn::Archived,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            BacklogColumn::Ideas => "Ideas",
            BacklogColumn::InAnalysis => "In Analysis",
            BacklogColumn::InExecution => "In Execution",
            BacklogColumn::Done => "Done",
            BacklogColumn::Archived => "Archived",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            BacklogColumn::Ideas => "#8b949e",
            BacklogColumn::InAnalysis => "#d29922",
            BacklogColumn::InExecution => "#388bfd",
            BacklogColumn::Done => "#3fb950",
            BacklogColumn::Archived => "#6e40c9",
        }
    }

    /// Ideas is manually curated only; every other column may be the
    /// target of an automatic pipeline move.
    pub fn allows_auto_move(&self) -> bool {
        !matches!(self, BacklogColumn::Ideas)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BacklogColumn::Ideas => "ideas",
            BacklogColumn::InAnalysis => "in_analysis",
            BacklogColumn::InExecution => "in_execution",
            BacklogColumn::Done => "done",
            BacklogColumn::Archived => "archived",
        }
    }
}

// ---------------------------------------------------------------------------
// BacklogCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogCategory {
    LegalTech,
    Ai,
    Security,
    Automation,
    Integration,
    Analytics,
    Ux,
    Infrastructure,
}

impl BacklogCategory {
    pub fn all() -> &'static [BacklogCategory] {
        &[
            BacklogCategory::LegalTech,
            BacklogCategory::Ai,
            BacklogCategory::Security,
            BacklogCategory::Automation,
            BacklogCategory::Integration,
            BacklogCategory::Analytics,
            BacklogCategory::Ux,
            BacklogCategory::Infrastructure,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            BacklogCategory::LegalTech => "Legal Tech",
            BacklogCategory::Ai => "AI",
            BacklogCategory::Security => "Security",
            BacklogCategory::Automation => "Automation",
            BacklogCategory::Integration => "Integration",
            BacklogCategory::Analytics => "Analytics",
            BacklogCategory::Ux => "UX",
            BacklogCategory::Infrastructure => "Infrastructure",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BacklogCategory::LegalTech => "legal_tech",
            BacklogCategory::Ai => "ai",
            BacklogCategory::Security => "security",
            BacklogCategory::Automation => "automation",
            BacklogCategory::Integration => "integration",
            BacklogCategory::Analytics => "analytics",
            BacklogCategory::Ux => "ux",
            BacklogCategory::Infrastructure => "infrastructure",
        }
    }
}

// ---------------------------------------------------------------------------
// ItemStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Draft,
    Approved,
    Rejected,
    Completed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Draft => "draft",
            ItemStatus::Approved => "approved",
            ItemStatus::Rejected => "rejected",
            ItemStatus::Completed => "completed",
        }
    }
}

// ---------------------------------------------------------------------------
// Checklist / attachments / comments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistEntry {
    pub id: String,
    pub text: String,
    pub done: bool,
}

impl ChecklistEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: ids::new_id("check"),
            text: text.into(),
            done: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ColumnMovement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMovement {
    pub from: BacklogColumn,
    pub to: BacklogColumn,
    pub moved_at: DateTime<Utc>,
    pub actor: String,
    pub automatic: bool,
}

// ---------------------------------------------------------------------------
// BacklogItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklogItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: BacklogCategory,
    pub module: ModuleName,
    pub priority: TaskPriority,
    pub status: ItemStatus,
    pub column: BacklogColumn,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub checklist: Vec<ChecklistEntry>,
    pub attachments: Vec<Attachment>,
    pub comments: Vec<Comment>,
    pub estimated_hours: Option<f32>,
    pub completion_percent: u8,
    /// Written once by the classification pipeline, immutable afterwards.
    pub analysis: Option<AiAnalysis>,
    pub linked_task_ids: Vec<String>,
    pub movement_history: Vec<ColumnMovement>,
}

/// Input for creating a backlog item; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub description: String,
    pub category: BacklogCategory,
    pub module: ModuleName,
    pub priority: TaskPriority,
    pub column: BacklogColumn,
    pub created_by: String,
    pub tags: Vec<String>,
    pub checklist: Vec<ChecklistEntry>,
    pub estimated_hours: Option<f32>,
}

impl NewItem {
    pub fn new(
        title: impl Into<String>,
        category: BacklogCategory,
        module: ModuleName,
        priority: TaskPriority,
    ) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category,
            module,
            priority,
            column: BacklogColumn::Ideas,
            created_by: "system".to_string(),
            tags: Vec::new(),
            checklist: Vec::new(),
            estimated_hours: None,
        }
    }

    pub fn into_item(self) -> BacklogItem {
        let now = ids::now();
        BacklogItem {
            id: ids::new_id("item"),
            title: self.title,
            description: self.description,
            category: self.category,
            module: self.module,
            priority: self.priority,
            status: ItemStatus::Draft,
            column: self.column,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
            tags: self.tags,
            checklist: self.checklist,
            attachments: Vec::new(),
            comments: Vec::new(),
            estimated_hours: self.estimated_hours,
            completion_percent: 0,
            analysis: None,
            linked_task_ids: Vec::new(),
            movement_history: Vec::new(),
        }
    }
}

/// Partial update for a backlog item; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<BacklogCategory>,
    pub module: Option<ModuleName>,
    pub priority: Option<TaskPriority>,
    pub status: Option<ItemStatus>,
    pub column: Option<BacklogColumn>,
    pub tags: Option<Vec<String>>,
    pub completion_percent: Option<u8>,
    pub estimated_hours: Option<f32>,
    /// Who to credit a column movement to when `column` changes.
    pub actor: Option<String>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Triage verdict for a backlog item. Evaluated top-down over the score;
/// the bands are exhaustive over [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    ImmediateAction,
    NeedsValidation,
    FutureSuggestion,
    Rejected,
}

impl Classification {
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            Classification::ImmediateAction
        } else if score >= 60 {
            Classification::NeedsValidation
        } else if score >= 40 {
            Classification::FutureSuggestion
        } else {
            Classification::Rejected
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Classification::ImmediateAction => "high business value and technical viability",
            Classification::NeedsValidation => "good idea, needs technical validation",
            Classification::FutureSuggestion => "future implementation recommended",
            Classification::Rejected => "low return or high complexity",
        }
    }

    pub fn needs_validation(&self) -> bool {
        matches!(self, Classification::NeedsValidation)
    }

    /// The 60–79 band is both "needs validation" and a future suggestion.
    pub fn future_suggestion(&self) -> bool {
        matches!(
            self,
            Classification::NeedsValidation | Classification::FutureSuggestion
        )
    }
}

// ---------------------------------------------------------------------------
// Technical assessment / synergy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalAssessment {
    pub complexity: Complexity,
    pub risks: Vec<String>,
    pub dependencies: Vec<String>,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynergyKind {
    Duplicate,
    Complement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynergyAction {
    Merge,
    Link,
}

/// A detected relationship between a backlog item and an existing task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synergy {
    pub task_id: String,
    pub kind: SynergyKind,
    pub description: String,
    pub action: SynergyAction,
}

// ---------------------------------------------------------------------------
// AiAnalysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub id: String,
    pub analyzed_at: DateTime<Utc>,
    /// Heuristic confidence in [70, 100].
    pub confidence: u8,
    pub score: u8,
    pub classification: Classification,
    pub reason: String,
    pub assessment: TechnicalAssessment,
    pub recommendations: Vec<String>,
    pub synergies: Vec<Synergy>,
}

// ---------------------------------------------------------------------------
// ProcessingRecord
// ---------------------------------------------------------------------------

/// Aggregated counters for one classification pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub items_processed: usize,
    pub items_approved: usize,
    pub items_rejected: usize,
    pub items_moved: usize,
    pub tasks_created: usize,
    pub elapsed_ms: u64,
    pub avg_confidence: f64,
}

// ---------------------------------------------------------------------------
// Execution log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOrigin {
    Manual,
    Automated,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub outcome: ActionOutcome,
    pub origin: ActionOrigin,
    pub module: Option<ModuleName>,
    pub elapsed_ms: u64,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDescriptor {
    /// `major.minor` string, e.g. `"1.4"`.
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub summary: String,
    pub actor: String,
    /// Digest of the serialized modules; change detection only.
    pub content_hash: String,
}
