//! Study Orchestrator (Stage 2): drives a fixed, time-bounded
//! multi-phase study of the Stage-1 corpus through the AI adapter.

pub mod orchestrator;

pub use orchestrator::StudyOrchestrator;

use serde::{Deserialize, Serialize};

/// The fixed five-phase schedule. Nominal weights (in minutes, against a
/// 5.5-minute reference budget) are `1, 1.5, 1.5, 1, 0.5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyPhase {
    Absorption,
    PatternAnalysis,
    InsightSynthesis,
    PredictiveModeling,
    Consolidation,
}

impl StudyPhase {
    pub const ALL: [StudyPhase; 5] = [
        StudyPhase::Absorption,
        StudyPhase::PatternAnalysis,
        StudyPhase::InsightSynthesis,
        StudyPhase::PredictiveModeling,
        StudyPhase::Consolidation,
    ];

    pub fn weight(self) -> f64 {
        match self {
            StudyPhase::Absorption => 1.0,
            StudyPhase::PatternAnalysis => 1.5,
            StudyPhase::InsightSynthesis => 1.5,
            StudyPhase::PredictiveModeling => 1.0,
            StudyPhase::Consolidation => 0.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StudyPhase::Absorption => "absorption",
            StudyPhase::PatternAnalysis => "pattern_analysis",
            StudyPhase::InsightSynthesis => "insight_synthesis",
            StudyPhase::PredictiveModeling => "predictive_modeling",
            StudyPhase::Consolidation => "consolidation",
        }
    }
}

const REFERENCE_WEIGHT_TOTAL: f64 = 5.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutput {
    pub phase: StudyPhase,
    pub summary: String,
    pub allotted_secs: f64,
    pub elapsed_secs: f64,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyMetadata {
    pub phases_attempted: u8,
    pub phases_completed: u8,
    pub duration_secs: f64,
    pub efficiency_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertiseMetrics {
    pub expertise_level: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertiseArtifact {
    pub session: String,
    pub patterns: Vec<String>,
    pub syntheses: Vec<String>,
    pub predictive_models: Vec<String>,
    pub metrics: ExpertiseMetrics,
    pub study_metadata: StudyMetadata,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub(crate) fn allotted_secs_for(phase: StudyPhase, budget_secs: f64) -> f64 {
    budget_secs * (phase.weight() / REFERENCE_WEIGHT_TOTAL)
}
