use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{BacklogCategory, BacklogItem, Classification, TaskPriority};

/// Base every item starts from before bonuses.
const BASE_SCORE: i32 = 50;
/// Jitter emulating analysis uncertainty, inclusive on both ends.
const JITTER_RANGE: std::ops::RangeInclusive<i32> = -10..=10;

/// Priority bonus table.
fn priority_bonus(priority: TaskPriority) -> i32 {
    match priority {
        TaskPriority::Critical => 30,
        TaskPriority::High => 20,
        TaskPriority::Medium => 10,
        TaskPriority::Low => 0,
    }
}

/// Category weight table (5–25). Legal tech, AI, and security rank highest.
fn category_weight(category: BacklogCategory) -> i32 {
    match category {
        BacklogCategory::LegalTech => 25,
        BacklogCategory::Ai => 25,
        BacklogCategory::Security => 20,
        BacklogCategory::Automation => 15,
        BacklogCategory::Integration => 12,
        BacklogCategory::Analytics => 10,
        BacklogCategory::Ux => 8,
        BacklogCategory::Infrastructure => 5,
    }
}

/// Heuristic scorer for backlog items.
///
/// The random jitter is part of the documented behavior, not an
/// implementation accident; callers must assert score *ranges*, never
/// exact values. The rng is injectable so tests can pin outcomes.
pub struct ScoringEngine {
    rng: StdRng,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Deterministic part of the score, before jitter and clamping.
    pub fn base_score(item: &BacklogItem) -> i32 {
        let mut score = BASE_SCORE;
        score += priority_bonus(item.priority);
        score += category_weight(item.category);
        if item.description.len() > 100 {
            score += 10;
        }
        if item.description.len() > 200 {
            score += 5;
        }
        if !item.checklist.is_empty() {
            score += 5;
        }
        score
    }

    /// Score an item: deterministic floor plus jitter, clamped to [0, 100].
    pub fn score(&mut self, item: &BacklogItem) -> u8 {
        let raw = Self::base_score(item) + self.rng.gen_range(JITTER_RANGE);
        raw.clamp(0, 100) as u8
    }

    /// Heuristic confidence in [70, 100].
    pub fn confidence(&mut self) -> u8 {
        self.rng.gen_range(70..=100)
    }

    /// Score and classify in one step.
    pub fn classify(&mut self, item: &BacklogItem) -> (u8, Classification) {
        let score = self.score(item);
        (score, Classification::from_score(score))
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}
