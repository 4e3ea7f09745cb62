//! Cross-cutting properties of the scoring and similarity heuristics.

use tp_core::scoring::ScoringEngine;
use tp_core::similarity::similarity;
use tp_core::types::*;

fn item(title: &str) -> NewItem {
    NewItem::new(
        title,
        BacklogCategory::LegalTech,
        ModuleName::Documents,
        TaskPriority::Critical,
    )
}

// ===========================================================================
// Scoring
// ===========================================================================

#[test]
fn flagship_item_floor_holds_under_jitter() {
    let mut new = item("Contract lifecycle automation");
    new.description = "d".repeat(220);
    new.checklist = vec![ChecklistEntry::new("scope the clause library")];
    let flagship = new.into_item();

    let floor = ScoringEngine::base_score(&flagship);
    assert_eq!(floor, 125);

    let mut engine = ScoringEngine::new();
    for _ in 0..300 {
        let score = i32::from(engine.score(&flagship));
        // Floor minus the jitter width, capped by the clamp.
        assert!(score >= (floor - 10).min(100));
        assert!(score <= 100);
    }
}

#[test]
fn every_score_maps_to_exactly_one_classification() {
    let mut seen = [0usize; 4];
    for score in 0..=100u8 {
        match Classification::from_score(score) {
            Classification::ImmediateAction => seen[0] += 1,
            Classification::NeedsValidation => seen[1] += 1,
            Classification::FutureSuggestion => seen[2] += 1,
            Classification::Rejected => seen[3] += 1,
        }
    }
    assert_eq!(seen.iter().sum::<usize>(), 101);
    assert_eq!(seen, [21, 20, 20, 40]);
}

#[test]
fn classification_reasons_are_the_canned_strings() {
    assert_eq!(
        Classification::ImmediateAction.reason(),
        "high business value and technical viability"
    );
    assert_eq!(
        Classification::NeedsValidation.reason(),
        "good idea, needs technical validation"
    );
    assert_eq!(
        Classification::FutureSuggestion.reason(),
        "future implementation recommended"
    );
    assert_eq!(
        Classification::Rejected.reason(),
        "low return or high complexity"
    );
}

// ===========================================================================
// Similarity
// ===========================================================================

#[test]
fn twin_items_clear_the_complement_threshold() {
    // Identical titles, same module, same priority.
    let i = item("automate retention holds").into_item();
    let t = NewTask::new(
        "automate retention holds",
        ModuleName::Documents,
        TaskPriority::Critical,
    )
    .into_task();
    assert!(similarity(&i, &t) >= 0.7);
}

#[test]
fn similarity_bounded_for_adversarial_inputs() {
    let mut new = item("");
    new.tags = vec![String::new(); 3];
    let empty_title = new.into_item();
    let mut task = NewTask::new("", ModuleName::Documents, TaskPriority::Critical).into_task();
    task.tags = vec![String::new()];

    let sim = similarity(&empty_title, &task);
    assert!((0.0..=1.0).contains(&sim));
}
