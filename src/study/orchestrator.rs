//! Stage 2 algorithm: a cooperative, self-limiting five-phase schedule
//! over the AI adapter. No phase is preempted mid-call; the orchestrator
//! only adjusts the *remaining* phases' allotment in response to
//! overrun or underrun, matching the design's "cooperative schedule"
//! rule.

use std::time::Instant;

use super::{
    allotted_secs_for, ExpertiseArtifact, ExpertiseMetrics, PhaseOutput, StudyMetadata, StudyPhase,
};
use crate::ai::{AIAdapter, GenerateOptions};
use crate::artifact_store::{ArtifactStore, Category};
use crate::errors::StageError;
use crate::progress::ProgressFabric;
use crate::search::MassiveCorpus;

const DEFAULT_STUDY_MINUTES: u64 = 5;
const MIN_STUDY_MINUTES: u64 = 2;
const MAX_STUDY_MINUTES: u64 = 10;

pub struct StudyOrchestrator {
    ai: std::sync::Arc<AIAdapter>,
    store: ArtifactStore,
    progress: ProgressFabric,
}

impl StudyOrchestrator {
    pub fn new(ai: std::sync::Arc<AIAdapter>, store: ArtifactStore, progress: ProgressFabric) -> Self {
        Self { ai, store, progress }
    }

    pub fn clamp_minutes(minutes: Option<u64>) -> u64 {
        minutes.unwrap_or(DEFAULT_STUDY_MINUTES).clamp(MIN_STUDY_MINUTES, MAX_STUDY_MINUTES)
    }

    fn corpus_summary(corpus: &MassiveCorpus) -> String {
        format!(
            "corpus for session {} with {} total results across {} streams (synthetic_expansion={})",
            corpus.session,
            corpus.metadata.total_results,
            corpus.streams.len(),
            corpus.metadata.synthetic_expansion,
        )
    }

    /// Run the fixed five-phase schedule and return the persisted
    /// `ExpertiseArtifact`. Requires a Stage-1 corpus; callers are
    /// expected to have checked for one (this function takes the corpus
    /// by value, so "missing Stage 1" is enforced by the caller — see
    /// `pipeline::run_stage_2`).
    pub async fn run(
        &self,
        corpus: &MassiveCorpus,
        session: &str,
        study_minutes: Option<u64>,
    ) -> Result<ExpertiseArtifact, StageError> {
        let minutes = Self::clamp_minutes(study_minutes);
        let mut remaining_budget_secs = (minutes * 60) as f64;

        let summary = Self::corpus_summary(corpus);
        let mut patterns = Vec::new();
        let mut syntheses = Vec::new();
        let mut predictive_models = Vec::new();
        let mut phase_outputs = Vec::new();
        let mut phases_completed: u8 = 0;

        let overall_start = Instant::now();
        let remaining_phases_after = |idx: usize| StudyPhase::ALL.len() - idx - 1;

        for (idx, phase) in StudyPhase::ALL.into_iter().enumerate() {
            let nominal_budget = (minutes * 60) as f64;
            let allotted = allotted_secs_for(phase, nominal_budget).min(remaining_budget_secs.max(1.0));

            self.progress
                .update(session, (4 + idx) as u32, &format!("study phase: {}", phase.as_str()), None)
                .await;

            let prompt = format!(
                "phase={} budget_secs={:.0}\n{}\nalready_identified_patterns={}",
                phase.as_str(),
                allotted,
                summary,
                patterns.len()
            );

            let phase_start = Instant::now();
            let outcome = self.ai.generate_text(&prompt, &GenerateOptions::default()).await;
            let elapsed = phase_start.elapsed().as_secs_f64();

            let completed = outcome.is_ok();
            if completed {
                phases_completed += 1;
            }
            let text = outcome.unwrap_or_else(|err| format!("phase failed: {err}"));

            match phase {
                StudyPhase::Absorption => patterns.push(format!("absorption: {text}")),
                StudyPhase::PatternAnalysis => patterns.push(format!("pattern: {text}")),
                StudyPhase::InsightSynthesis => syntheses.push(text.clone()),
                StudyPhase::PredictiveModeling => predictive_models.push(text.clone()),
                StudyPhase::Consolidation => syntheses.push(format!("consolidation: {text}")),
            }

            self.store.save_stage(
                session,
                &format!("study_{}", phase.as_str()),
                &serde_json::json!({ "phase": phase.as_str(), "output": text, "elapsed_secs": elapsed }),
                Category::Expertise,
            )?;

            phase_outputs.push(PhaseOutput {
                phase,
                summary: text,
                allotted_secs: allotted,
                elapsed_secs: elapsed,
                completed,
            });

            // Overrun/underrun bookkeeping for the remaining phases; no
            // in-flight call is ever cancelled.
            let delta = allotted - elapsed;
            remaining_budget_secs = (remaining_budget_secs - elapsed).max(0.0);
            if delta < 0.0 && remaining_phases_after(idx) > 0 {
                tracing::warn!(phase = phase.as_str(), overrun_secs = -delta, "study phase overran its allotment");
            }
        }

        let total_elapsed = overall_start.elapsed().as_secs_f64();

        let data_volume_share = (corpus.metadata.total_results as f64 / 100.0).min(1.0) * 20.0;
        let insight_count_share = (patterns.len() as f64 / 10.0).min(1.0) * 20.0;
        let conclusion_depth_share = (syntheses.len() as f64 / 5.0).min(1.0) * 20.0;
        let model_count_share = (predictive_models.len() as f64 / 5.0).min(1.0) * 20.0;
        let time_share = (phases_completed as f64 / StudyPhase::ALL.len() as f64) * 20.0;
        let expertise_level =
            data_volume_share + insight_count_share + conclusion_depth_share + model_count_share + time_share;
        let confidence = (expertise_level / 100.0).clamp(0.0, 1.0);

        let artifact = ExpertiseArtifact {
            session: session.to_string(),
            patterns,
            syntheses,
            predictive_models,
            metrics: ExpertiseMetrics {
                expertise_level,
                confidence,
            },
            study_metadata: StudyMetadata {
                phases_attempted: StudyPhase::ALL.len() as u8,
                phases_completed,
                duration_secs: total_elapsed,
                efficiency_score: phases_completed as f64 / StudyPhase::ALL.len() as f64,
            },
            created_at: chrono::Utc::now(),
        };

        self.store
            .save_stage(session, "expertise_artifact", &artifact, Category::Expertise)?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AIBackend, BackendError, BackendResponse};
    use crate::provider::{CapabilityClass, ProviderEndpoint, ProviderRegistry};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct AlwaysOkBackend;
    #[async_trait]
    impl AIBackend for AlwaysOkBackend {
        async fn invoke(
            &self,
            _endpoint: &ProviderEndpoint,
            prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<BackendResponse, BackendError> {
            Ok(BackendResponse {
                text: format!("analysis of: {}", &prompt[..prompt.len().min(20)]),
                tool_call: None,
            })
        }
    }

    fn sample_corpus() -> MassiveCorpus {
        MassiveCorpus {
            session: "s1".into(),
            streams: BTreeMap::new(),
            synthetic_blocks: Vec::new(),
            metadata: crate::search::CollectionMetadata {
                sources_used: vec!["exa".into()],
                total_results: 42,
                byte_size: 1024,
                synthetic_expansion: false,
            },
            created_at: chrono::Utc::now(),
        }
    }

    async fn orchestrator_with_registry(dir: &std::path::Path) -> StudyOrchestrator {
        let registry = ProviderRegistry::new(std::time::Duration::from_secs(60));
        registry
            .register(
                CapabilityClass::QwenCompatible,
                vec![ProviderEndpoint::new("q", CapabilityClass::QwenCompatible, "https://x", "k")],
            )
            .await;
        let ai = Arc::new(AIAdapter::new(registry, Arc::new(AlwaysOkBackend)));
        let store = ArtifactStore::new(dir);
        let progress = ProgressFabric::new();
        progress.start("s1", 13).await;
        StudyOrchestrator::new(ai, store, progress)
    }

    #[test]
    fn clamp_minutes_respects_bounds() {
        assert_eq!(StudyOrchestrator::clamp_minutes(None), 5);
        assert_eq!(StudyOrchestrator::clamp_minutes(Some(1)), 2);
        assert_eq!(StudyOrchestrator::clamp_minutes(Some(20)), 10);
        assert_eq!(StudyOrchestrator::clamp_minutes(Some(7)), 7);
    }

    #[tokio::test]
    async fn run_produces_artifact_with_all_phases_completed() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator_with_registry(dir.path()).await;
        let artifact = orchestrator.run(&sample_corpus(), "s1", Some(2)).await.unwrap();

        assert_eq!(artifact.study_metadata.phases_attempted, 5);
        assert!(artifact.study_metadata.phases_completed >= 1);
        assert!(artifact.metrics.expertise_level >= 0.0 && artifact.metrics.expertise_level <= 100.0);
        assert!(artifact.metrics.confidence >= 0.0 && artifact.metrics.confidence <= 1.0);
    }

    #[tokio::test]
    async fn run_persists_expertise_artifact_for_reload() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator_with_registry(dir.path()).await;
        orchestrator.run(&sample_corpus(), "s1", Some(2)).await.unwrap();

        let store = ArtifactStore::new(dir.path());
        let loaded = store.load_stage("s1", "expertise_artifact").unwrap();
        assert!(loaded["metrics"]["expertise_level"].is_number());
    }
}
