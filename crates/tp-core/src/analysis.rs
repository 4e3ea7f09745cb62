//! Synthetic module analysis: a deterministic/randomized stand-in for an
//! external analysis provider, producing per-module findings that the
//! action-plan store converts into tasks.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::types::ModuleName;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Full,
    Performance,
    Bugs,
    Suggestions,
}

/// One module's synthetic findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleFinding {
    pub module: ModuleName,
    pub performance_score: f64,
    pub satisfaction_score: f64,
    pub uptime: f64,
    pub error_rate: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Result of one `run_ai_analysis` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleAnalysis {
    pub id: String,
    pub kind: AnalysisKind,
    pub scope: Vec<ModuleName>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub findings: Vec<ModuleFinding>,
    pub tasks_created: usize,
}

// ---------------------------------------------------------------------------
// FindingsGenerator
// ---------------------------------------------------------------------------

/// Generates the synthetic findings. Seedable so tests can pin outcomes.
pub struct FindingsGenerator {
    rng: StdRng,
}

impl FindingsGenerator {
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

    /// Produce one finding per module in scope. Kind controls which
    /// sections are populated: Performance keeps only metrics, Bugs only
    /// issues, Suggestions only suggestions, Full everything.
    pub fn generate(&mut self, kind: AnalysisKind, scope: &[ModuleName]) -> Vec<ModuleFinding> {
        scope
            .iter()
            .map(|module| {
                let issues = match kind {
                    AnalysisKind::Full | AnalysisKind::Bugs => {
                        canned_issues(*module).iter().map(|s| (*s).to_string()).collect()
                    }
                    _ => Vec::new(),
                };
                let suggestions = match kind {
                    AnalysisKind::Full | AnalysisKind::Suggestions | AnalysisKind::Performance => {
                        canned_suggestions(*module)
                            .iter()
                            .map(|s| (*s).to_string())
                            .collect()
                    }
                    AnalysisKind::Bugs => Vec::new(),
                };
                ModuleFinding {
                    module: *module,
                    performance_score: self.rng.gen_range(60.0..100.0),
                    satisfaction_score: self.rng.gen_range(60.0..100.0),
                    uptime: self.rng.gen_range(97.0..100.0),
                    error_rate: self.rng.gen_range(0.0..3.0),
                    issues,
                    suggestions,
                }
            })
            .collect()
    }
}

impl Default for FindingsGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn canned_issues(module: ModuleName) -> &'static [&'static str] {
    match module {
        ModuleName::Crm => &[
            "contact dedup misses accent variants",
            "activity timeline pagination resets on refresh",
        ],
        ModuleName::Billing => &[
            "proration rounding drifts on multi-seat plans",
            "dunning retries ignore the grace period",
        ],
        ModuleName::Documents => &[
            "template merge fields fail on nested clauses",
            "large uploads stall past 50MB",
        ],
        ModuleName::Automation => &[
            "workflow triggers double-fire on bulk imports",
        ],
        ModuleName::Analytics => &[
            "funnel report excludes archived deals",
        ],
        ModuleName::Platform => &[
            "webhook delivery retries lack backoff",
            "audit export times out on large tenants",
        ],
    }
}

fn canned_suggestions(module: ModuleName) -> &'static [&'static str] {
    match module {
        ModuleName::Crm => &["surface duplicate candidates at entry time"],
        ModuleName::Billing => &["reconcile ledger snapshots nightly"],
        ModuleName::Documents => &["pre-render clause previews for the top templates"],
        ModuleName::Automation => &["batch trigger evaluation during imports"],
        ModuleName::Analytics => &["materialize the funnel query for large tenants"],
        ModuleName::Platform => &["add jittered backoff to webhook retries"],
    }
}
