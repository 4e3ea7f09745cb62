use std::collections::HashSet;

use crate::types::{BacklogItem, Synergy, SynergyAction, SynergyKind, Task};

/// Above this the pair is treated as a duplicate.
const DUPLICATE_THRESHOLD: f64 = 0.9;
/// Above this (and at most the duplicate threshold) the pair complements.
const COMPLEMENT_THRESHOLD: f64 = 0.7;

/// Pairwise similarity between a backlog item and a task, in [0, 1].
///
/// Weighted sum: 0.4 title token overlap, 0.3 same module, 0.2 adjacent
/// priority rank, 0.1 tag overlap (only when both sides carry tags).
pub fn similarity(item: &BacklogItem, task: &Task) -> f64 {
    let mut sim = 0.4 * token_overlap(&item.title, &task.title);
    if item.module == task.module {
        sim += 0.3;
    }
    if item.priority.rank().abs_diff(task.priority.rank()) <= 1 {
        sim += 0.2;
    }
    if !item.tags.is_empty() && !task.tags.is_empty() {
        sim += 0.1 * set_overlap(&item.tags, &task.tags);
    }
    sim.clamp(0.0, 1.0)
}

/// Classify a pair into a synergy, if the similarity clears a threshold.
/// A `Merge` action is a recommendation only; nothing executes merges.
pub fn detect_synergy(item: &BacklogItem, task: &Task) -> Option<Synergy> {
    let sim = similarity(item, task);
    if sim > DUPLICATE_THRESHOLD {
        Some(Synergy {
            task_id: task.id.clone(),
            kind: SynergyKind::Duplicate,
            description: format!("near-identical to task '{}' (similarity {sim:.2})", task.title),
            action: SynergyAction::Merge,
        })
    } else if sim > COMPLEMENT_THRESHOLD {
        Some(Synergy {
            task_id: task.id.clone(),
            kind: SynergyKind::Complement,
            description: format!("complements task '{}' (similarity {sim:.2})", task.title),
            action: SynergyAction::Link,
        })
    } else {
        None
    }
}

/// Lower-cased word overlap: intersection size over the larger word set.
fn token_overlap(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let set_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    let max = set_a.len().max(set_b.len());
    if max == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / max as f64
}

fn set_overlap(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let max = set_a.len().max(set_b.len());
    if max == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / max as f64
}
