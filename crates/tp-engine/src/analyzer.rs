use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use tp_core::ids;
use tp_core::scoring::ScoringEngine;
use tp_core::similarity::detect_synergy;
use tp_core::types::{
    AiAnalysis, BacklogCategory, BacklogItem, Classification, Complexity, Synergy, SynergyAction,
    Task, TaskPriority, TechnicalAssessment,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// A single item's analysis failed; the batch continues.
    #[error("item analysis failed: {0}")]
    Item(String),
    /// The analyzer itself is unusable; aborts the current run.
    #[error("analyzer unavailable: {0}")]
    Fatal(String),
}

// ---------------------------------------------------------------------------
// ItemAnalyzer
// ---------------------------------------------------------------------------

/// Seam between the pipeline and the analysis provider. In production
/// this is the heuristic stand-in; a real external integration would live
/// behind the same trait, which is why the call is async and bounded by
/// the pipeline's per-item timeout.
#[async_trait]
pub trait ItemAnalyzer: Send + Sync {
    async fn analyze(&self, item: &BacklogItem, tasks: &[Task])
        -> Result<AiAnalysis, AnalyzerError>;
}

// ---------------------------------------------------------------------------
// HeuristicAnalyzer
// ---------------------------------------------------------------------------

/// The documented deterministic-plus-jitter analysis stand-in: scores the
/// item, classifies it, assesses complexity, and scans the given tasks
/// for synergies.
pub struct HeuristicAnalyzer {
    engine: Mutex<ScoringEngine>,
}

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self {
            engine: Mutex::new(ScoringEngine::new()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            engine: Mutex::new(ScoringEngine::with_seed(seed)),
        }
    }
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemAnalyzer for HeuristicAnalyzer {
    async fn analyze(
        &self,
        item: &BacklogItem,
        tasks: &[Task],
    ) -> Result<AiAnalysis, AnalyzerError> {
        let (score, confidence) = {
            let mut engine = self.engine.lock().expect("scoring engine lock poisoned");
            (engine.score(item), engine.confidence())
        };
        let classification = Classification::from_score(score);

        let synergies: Vec<Synergy> = tasks
            .iter()
            .filter_map(|task| detect_synergy(item, task))
            .collect();

        Ok(AiAnalysis {
            id: ids::new_id("analysis"),
            analyzed_at: ids::now(),
            confidence,
            score,
            classification,
            reason: classification.reason().to_string(),
            assessment: assess(item),
            recommendations: recommend(classification, &synergies),
            synergies,
        })
    }
}

// ---------------------------------------------------------------------------
// Assessment helpers
// ---------------------------------------------------------------------------

fn assess(item: &BacklogItem) -> TechnicalAssessment {
    let complexity = match item.estimated_hours {
        Some(h) if h > 40.0 => Complexity::Complex,
        Some(h) if h > 8.0 => Complexity::Medium,
        Some(_) => Complexity::Simple,
        None if item.checklist.len() > 5 || item.description.len() > 200 => Complexity::Medium,
        None => Complexity::Simple,
    };

    let mut risks = Vec::new();
    if item.priority == TaskPriority::Critical {
        risks.push("tight timeline pressure".to_string());
    }
    if item.category == BacklogCategory::Security {
        risks.push("requires a security review".to_string());
    }
    if complexity == Complexity::Complex {
        risks.push("scope may grow during implementation".to_string());
    }

    let dependencies = vec![format!("{} module owners", item.module.label())];

    let resources = match complexity {
        Complexity::Simple => vec!["one engineer".to_string()],
        Complexity::Medium => vec!["one engineer".to_string(), "reviewer".to_string()],
        Complexity::Complex => vec![
            "feature team".to_string(),
            "architecture review".to_string(),
        ],
    };

    TechnicalAssessment {
        complexity,
        risks,
        dependencies,
        resources,
    }
}

fn recommend(classification: Classification, synergies: &[Synergy]) -> Vec<String> {
    let mut out = vec![match classification {
        Classification::ImmediateAction => "schedule into the active sprint".to_string(),
        Classification::NeedsValidation => "run a technical spike before committing".to_string(),
        Classification::FutureSuggestion => {
            "park in the roadmap for the next planning cycle".to_string()
        }
        Classification::Rejected => "archive; revisit if priorities shift".to_string(),
    }];
    for synergy in synergies {
        match synergy.action {
            // Merge is a recommendation only; nothing executes it.
            SynergyAction::Merge => {
                out.push(format!("consider merging with task {}", synergy.task_id));
            }
            SynergyAction::Link => out.push(format!("link to task {}", synergy.task_id)),
        }
    }
    out
}
