use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use tp_core::config::BoardConfig;
use tp_core::ids;
use tp_core::types::{
    AiAnalysis, BacklogCategory, BacklogColumn, BacklogItem, ColumnMovement, ItemPatch, ItemStatus,
    ModuleName, NewItem, TaskPriority,
};

use crate::bus::SnapshotBus;
use crate::export::{csv_record, ExportError};

const ITEM_CSV_HEADER: &str =
    "id,title,category,module,priority,status,column,created_by,tags,completion_percent,created_at,updated_at";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BacklogError {
    #[error("item title must not be empty")]
    EmptyTitle,
}

// ---------------------------------------------------------------------------
// Snapshot / stats / filter / export options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub items: Vec<BacklogItem>,
    pub stats: BoardStats,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnCount {
    pub column: BacklogColumn,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardStats {
    pub total: usize,
    pub per_column: Vec<ColumnCount>,
    pub analyzed: usize,
    /// Mean confidence over analyzed items; 0 when none are analyzed.
    pub avg_confidence: f64,
}

/// Criteria for `filter_items`; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub categories: Option<Vec<BacklogCategory>>,
    pub priorities: Option<Vec<TaskPriority>>,
    pub statuses: Option<Vec<ItemStatus>>,
    pub columns: Option<Vec<BacklogColumn>>,
    pub modules: Option<Vec<ModuleName>>,
    pub creators: Option<Vec<String>>,
    /// Case-insensitive substring match over title, description, and tags.
    pub text: Option<String>,
    pub has_analysis: Option<bool>,
    pub approved_only: bool,
    pub tags: Option<Vec<String>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl ItemFilter {
    fn matches(&self, item: &BacklogItem) -> bool {
        if let Some(categories) = &self.categories {
            if !categories.contains(&item.category) {
                return false;
            }
        }
        if let Some(priorities) = &self.priorities {
            if !priorities.contains(&item.priority) {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&item.status) {
                return false;
            }
        }
        if let Some(columns) = &self.columns {
            if !columns.contains(&item.column) {
                return false;
            }
        }
        if let Some(modules) = &self.modules {
            if !modules.contains(&item.module) {
                return false;
            }
        }
        if let Some(creators) = &self.creators {
            if !creators.contains(&item.created_by) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let in_title = item.title.to_lowercase().contains(&needle);
            let in_description = item.description.to_lowercase().contains(&needle);
            let in_tags = item
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(&needle));
            if !(in_title || in_description || in_tags) {
                return false;
            }
        }
        if let Some(wants) = self.has_analysis {
            if item.analysis.is_some() != wants {
                return false;
            }
        }
        if self.approved_only && item.status != ItemStatus::Approved {
            return false;
        }
        if let Some(tags) = &self.tags {
            if !item.tags.iter().any(|t| tags.contains(t)) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if item.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if item.created_at > before {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardExportFormat {
    Json,
    Csv,
    /// Columns → cards shape for external board tools.
    Board,
}

// ---------------------------------------------------------------------------
// BacklogStore
// ---------------------------------------------------------------------------

struct BoardState {
    items: Vec<BacklogItem>,
    config: BoardConfig,
}

/// Owns the Kanban board: backlog items, their column placement and
/// movement history, and board statistics. Mutations publish the full
/// snapshot to subscribers after the lock is released.
pub struct BacklogStore {
    state: Mutex<BoardState>,
    bus: SnapshotBus<BoardSnapshot>,
}

impl BacklogStore {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            state: Mutex::new(BoardState {
                items: Vec::new(),
                config,
            }),
            bus: SnapshotBus::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().expect("BacklogStore lock poisoned")
    }

    fn snapshot_locked(state: &BoardState) -> BoardSnapshot {
        BoardSnapshot {
            items: state.items.clone(),
            stats: stats_of(&state.items),
            generated_at: ids::now(),
        }
    }

    // -- subscriptions ------------------------------------------------------

    pub fn subscribe(&self) -> flume::Receiver<BoardSnapshot> {
        self.bus.subscribe()
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        Self::snapshot_locked(&self.lock())
    }

    // -- item operations ----------------------------------------------------

    /// Create an item. An empty (or whitespace) title is rejected before
    /// any mutation.
    pub fn create_item(&self, new: NewItem) -> Result<String, BacklogError> {
        if new.title.trim().is_empty() {
            return Err(BacklogError::EmptyTitle);
        }
        let snapshot;
        let id;
        {
            let mut state = self.lock();
            let column = new.column;
            let in_column = state.items.iter().filter(|i| i.column == column).count();
            if in_column >= state.config.max_items_per_column {
                // Advisory cap only; the insert still proceeds.
                warn!(
                    column = column.as_str(),
                    cap = state.config.max_items_per_column,
                    "column is over its soft cap"
                );
            }
            let item = new.into_item();
            id = item.id.clone();
            info!(item_id = %id, column = column.as_str(), "backlog item created");
            state.items.push(item);
            snapshot = Self::snapshot_locked(&state);
        }
        self.bus.publish(snapshot);
        Ok(id)
    }

    /// Merge a partial update; a column change is recorded in the item's
    /// movement history. Returns false when the id is unknown.
    pub fn update_item(&self, id: &str, patch: ItemPatch) -> bool {
        let snapshot = {
            let mut state = self.lock();
            let Some(item) = state.items.iter_mut().find(|i| i.id == id) else {
                warn!(item_id = id, "update_item: id not found");
                return false;
            };
            let actor = patch
                .actor
                .clone()
                .unwrap_or_else(|| "system".to_string());
            if let Some(to) = patch.column {
                if to != item.column {
                    record_movement(item, to, &actor, false);
                }
            }
            apply_item_patch(item, patch);
            Self::snapshot_locked(&state)
        };
        self.bus.publish(snapshot);
        true
    }

    /// Move an item to a column on behalf of `actor` (manual move).
    pub fn move_item(&self, id: &str, to: BacklogColumn, actor: &str) -> bool {
        self.move_item_as(id, to, actor, false)
    }

    /// Move an item; `automatic` marks pipeline-driven moves, which are
    /// refused for columns that do not allow them.
    pub fn move_item_as(&self, id: &str, to: BacklogColumn, actor: &str, automatic: bool) -> bool {
        if automatic && !to.allows_auto_move() {
            warn!(column = to.as_str(), "automatic move refused: manual column");
            return false;
        }
        let snapshot = {
            let mut state = self.lock();
            let Some(item) = state.items.iter_mut().find(|i| i.id == id) else {
                warn!(item_id = id, "move_item: id not found");
                return false;
            };
            if item.column == to {
                return true;
            }
            record_movement(item, to, actor, automatic);
            item.column = to;
            item.updated_at = ids::now();
            debug!(item_id = id, to = to.as_str(), automatic, "item moved");
            Self::snapshot_locked(&state)
        };
        self.bus.publish(snapshot);
        true
    }

    /// Attach the analysis record. Refused (returns false) when the item
    /// already carries one — the record is immutable once written.
    pub fn apply_analysis(&self, id: &str, analysis: AiAnalysis) -> bool {
        let snapshot = {
            let mut state = self.lock();
            let Some(item) = state.items.iter_mut().find(|i| i.id == id) else {
                warn!(item_id = id, "apply_analysis: id not found");
                return false;
            };
            if item.analysis.is_some() {
                warn!(item_id = id, "apply_analysis: record already present");
                return false;
            }
            item.analysis = Some(analysis);
            item.updated_at = ids::now();
            Self::snapshot_locked(&state)
        };
        self.bus.publish(snapshot);
        true
    }

    /// Set the lifecycle status. Returns false when the id is unknown.
    pub fn set_status(&self, id: &str, status: ItemStatus) -> bool {
        self.update_item(
            id,
            ItemPatch {
                status: Some(status),
                ..ItemPatch::default()
            },
        )
    }

    /// Append a related task id (deduplicated).
    pub fn link_task(&self, id: &str, task_id: &str) -> bool {
        let snapshot = {
            let mut state = self.lock();
            let Some(item) = state.items.iter_mut().find(|i| i.id == id) else {
                warn!(item_id = id, "link_task: id not found");
                return false;
            };
            if !item.linked_task_ids.iter().any(|t| t == task_id) {
                item.linked_task_ids.push(task_id.to_string());
                item.updated_at = ids::now();
            }
            Self::snapshot_locked(&state)
        };
        self.bus.publish(snapshot);
        true
    }

    pub fn delete_item(&self, id: &str) -> bool {
        let snapshot = {
            let mut state = self.lock();
            let Some(index) = state.items.iter().position(|i| i.id == id) else {
                warn!(item_id = id, "delete_item: id not found");
                return false;
            };
            state.items.remove(index);
            Self::snapshot_locked(&state)
        };
        self.bus.publish(snapshot);
        true
    }

    // -- reads --------------------------------------------------------------

    pub fn item(&self, id: &str) -> Option<BacklogItem> {
        self.lock().items.iter().find(|i| i.id == id).cloned()
    }

    /// Pure read; items in insertion order.
    pub fn filter_items(&self, filter: &ItemFilter) -> Vec<BacklogItem> {
        self.lock()
            .items
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect()
    }

    /// Items in `column` with no analysis record yet, insertion order,
    /// capped at `limit`. This is the pipeline's batch selection.
    pub fn unanalyzed_in(&self, column: BacklogColumn, limit: usize) -> Vec<BacklogItem> {
        self.lock()
            .items
            .iter()
            .filter(|i| i.column == column && i.analysis.is_none())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> BoardStats {
        stats_of(&self.lock().items)
    }

    pub fn item_count(&self) -> usize {
        self.lock().items.len()
    }

    // -- export -------------------------------------------------------------

    pub fn export(&self, format: BoardExportFormat) -> Result<String, ExportError> {
        let state = self.lock();
        match format {
            BoardExportFormat::Json => {
                let root = serde_json::json!({
                    "generated_at": ids::now(),
                    "stats": stats_of(&state.items),
                    "items": state.items,
                });
                Ok(serde_json::to_string_pretty(&root)?)
            }
            BoardExportFormat::Csv => {
                let mut out = String::from(ITEM_CSV_HEADER);
                for item in &state.items {
                    out.push('\n');
                    out.push_str(&item_csv_row(item));
                }
                Ok(out)
            }
            BoardExportFormat::Board => {
                let columns: Vec<serde_json::Value> = BacklogColumn::ordered()
                    .iter()
                    .map(|column| {
                        let cards: Vec<serde_json::Value> = state
                            .items
                            .iter()
                            .filter(|i| i.column == *column)
                            .map(board_card)
                            .collect();
                        serde_json::json!({
                            "column": column.as_str(),
                            "label": column.label(),
                            "color": column.color(),
                            "cards": cards,
                        })
                    })
                    .collect();
                let root = serde_json::json!({
                    "board": "taskpilot-backlog",
                    "exported_at": ids::now(),
                    "columns": columns,
                });
                Ok(serde_json::to_string_pretty(&root)?)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn record_movement(item: &mut BacklogItem, to: BacklogColumn, actor: &str, automatic: bool) {
    item.movement_history.push(ColumnMovement {
        from: item.column,
        to,
        moved_at: ids::now(),
        actor: actor.to_string(),
        automatic,
    });
}

fn apply_item_patch(item: &mut BacklogItem, patch: ItemPatch) {
    if let Some(title) = patch.title {
        item.title = title;
    }
    if let Some(description) = patch.description {
        item.description = description;
    }
    if let Some(category) = patch.category {
        item.category = category;
    }
    if let Some(module) = patch.module {
        item.module = module;
    }
    if let Some(priority) = patch.priority {
        item.priority = priority;
    }
    if let Some(status) = patch.status {
        item.status = status;
    }
    if let Some(column) = patch.column {
        item.column = column;
    }
    if let Some(tags) = patch.tags {
        item.tags = tags;
    }
    if let Some(pct) = patch.completion_percent {
        item.completion_percent = pct.min(100);
    }
    if let Some(hours) = patch.estimated_hours {
        item.estimated_hours = Some(hours);
    }
    item.updated_at = ids::now();
}

fn stats_of(items: &[BacklogItem]) -> BoardStats {
    let per_column = BacklogColumn::ordered()
        .iter()
        .map(|column| ColumnCount {
            column: *column,
            count: items.iter().filter(|i| i.column == *column).count(),
        })
        .collect();
    let analyzed: Vec<&BacklogItem> = items.iter().filter(|i| i.analysis.is_some()).collect();
    let avg_confidence = if analyzed.is_empty() {
        0.0
    } else {
        analyzed
            .iter()
            .filter_map(|i| i.analysis.as_ref())
            .map(|a| f64::from(a.confidence))
            .sum::<f64>()
            / analyzed.len() as f64
    };
    BoardStats {
        total: items.len(),
        per_column,
        analyzed: analyzed.len(),
        avg_confidence,
    }
}

fn item_csv_row(item: &BacklogItem) -> String {
    let pct = item.completion_percent.to_string();
    let tags = item.tags.join(";");
    let created = item.created_at.to_rfc3339();
    let updated = item.updated_at.to_rfc3339();
    csv_record([
        item.id.as_str(),
        item.title.as_str(),
        item.category.as_str(),
        item.module.label(),
        item.priority.as_str(),
        item.status.as_str(),
        item.column.as_str(),
        item.created_by.as_str(),
        tags.as_str(),
        pct.as_str(),
        created.as_str(),
        updated.as_str(),
    ])
}

/// Card shape for the board-interop export: labels carry the category
/// and priority, checklist entries become sub-items.
fn board_card(item: &BacklogItem) -> serde_json::Value {
    let checklist: Vec<serde_json::Value> = item
        .checklist
        .iter()
        .map(|c| serde_json::json!({ "text": c.text, "done": c.done }))
        .collect();
    serde_json::json!({
        "id": item.id,
        "title": item.title,
        "description": item.description,
        "labels": [item.category.as_str(), item.priority.as_str()],
        "checklist": checklist,
        "linked_tasks": item.linked_task_ids,
    })
}
