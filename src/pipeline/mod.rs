//! Master Pipeline Orchestrator: composes the three stage orchestrators
//! behind a single entry surface, checkpointing session state after
//! every stage so a later call can resume from whatever the session
//! already has rather than re-running completed work.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::ai::AIAdapter;
use crate::artifact_store::ArtifactStore;
use crate::brief::Brief;
use crate::errors::{ArtifactError, StageError};
use crate::progress::ProgressFabric;
use crate::provider::ProviderRegistry;
use crate::report::{FinalReport, ReportCompiler};
use crate::search::orchestrator::{SearchOrchestrator, StreamFetcher};
use crate::search::MassiveCorpus;
use crate::session::{Session, SessionStatus, SessionStore};
use crate::study::orchestrator::StudyOrchestrator;
use crate::study::ExpertiseArtifact;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: u8,
    pub success: bool,
    pub duration_secs: f64,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub session: String,
    pub success: bool,
    pub stages: Vec<StageSummary>,
    pub total_duration_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub last_execution_at: Option<chrono::DateTime<chrono::Utc>>,
    pub average_duration_secs: f64,
}

impl PipelineStats {
    fn record(&mut self, success: bool, duration_secs: f64) {
        self.total_executions += 1;
        if success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }
        self.last_execution_at = Some(chrono::Utc::now());
        let n = self.total_executions as f64;
        self.average_duration_secs += (duration_secs - self.average_duration_secs) / n;
    }
}

/// Everything one stage needs, bundled so `pipeline::run_*` functions
/// don't have to thread eight constructor arguments through.
pub struct PipelineOrchestrator {
    registry: ProviderRegistry,
    store: ArtifactStore,
    progress: ProgressFabric,
    sessions: SessionStore,
    ai: Arc<AIAdapter>,
    fetcher: Arc<dyn StreamFetcher>,
    stage1_target_bytes: u64,
    in_flight: Mutex<HashSet<String>>,
    stats: Mutex<PipelineStats>,
}

impl PipelineOrchestrator {
    pub fn new(
        registry: ProviderRegistry,
        store: ArtifactStore,
        progress: ProgressFabric,
        sessions: SessionStore,
        ai: Arc<AIAdapter>,
        fetcher: Arc<dyn StreamFetcher>,
        stage1_target_bytes: u64,
    ) -> Self {
        Self {
            registry,
            store,
            progress,
            sessions,
            ai,
            fetcher,
            stage1_target_bytes,
            in_flight: Mutex::new(HashSet::new()),
            stats: Mutex::new(PipelineStats::default()),
        }
    }

    fn search_orchestrator(&self) -> SearchOrchestrator {
        SearchOrchestrator::new(
            self.registry.clone(),
            self.store.clone(),
            self.progress.clone(),
            self.fetcher.clone(),
            self.stage1_target_bytes,
        )
    }

    fn study_orchestrator(&self) -> StudyOrchestrator {
        StudyOrchestrator::new(self.ai.clone(), self.store.clone(), self.progress.clone())
    }

    fn report_compiler(&self) -> ReportCompiler {
        ReportCompiler::new(self.store.clone())
    }

    /// Load an existing session by id, or mint and persist a fresh one
    /// from `brief` when no id is given.
    async fn resolve_session(&self, brief: &Brief, session: Option<&str>) -> Result<Session, StageError> {
        match session {
            Some(id) => Ok(self.sessions.load(id)?),
            None => {
                let session = Session::new(brief.clone());
                self.sessions.save_active(&session)?;
                Ok(session)
            }
        }
    }

    /// Standalone Stage 1 entry point: creates a session if `session` is
    /// absent, runs collection, and persists its own result regardless
    /// of whether it's being called from `run_full` or directly.
    pub async fn run_stage_1(
        &self,
        brief: &Brief,
        session: Option<&str>,
    ) -> Result<(Session, MassiveCorpus), StageError> {
        let mut session = self.resolve_session(brief, session).await?;
        self.progress.start(&session.id, crate::progress::DEFAULT_TOTAL_STEPS).await;
        session.mark_stage_started(1);
        self.sessions.save_active(&session)?;

        let started = Instant::now();
        let outcome = self.search_orchestrator().run(brief, &session.id).await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(corpus) => {
                session.mark_stage_completed(1, elapsed);
                self.sessions.save_active(&session)?;
                Ok((session, corpus))
            }
            Err(err) => {
                session.mark_stage_failed(1);
                self.sessions.save_active(&session)?;
                Err(err)
            }
        }
    }

    /// Standalone Stage 2 entry point. Requires a Stage-1 corpus already
    /// persisted against `session` — absence is a `StageInputMissing`,
    /// never an implicit re-run of Stage 1.
    pub async fn run_stage_2(
        &self,
        session: &str,
        study_minutes: Option<u64>,
    ) -> Result<(Session, ExpertiseArtifact), StageError> {
        let mut session_record = self.sessions.load(session)?;
        let corpus_value = self.store.load_stage(session, "massive_corpus").map_err(|_| {
            StageError::StageInputMissing {
                stage: 2,
                detail: format!("session {session} has no Stage 1 collection artifact"),
            }
        })?;
        let corpus: MassiveCorpus = serde_json::from_value(corpus_value).map_err(ArtifactError::from)?;

        session_record.mark_stage_started(2);
        self.sessions.save_active(&session_record)?;

        let started = Instant::now();
        let outcome = self.study_orchestrator().run(&corpus, session, study_minutes).await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(artifact) => {
                session_record.mark_stage_completed(2, elapsed);
                self.sessions.save_active(&session_record)?;
                Ok((session_record, artifact))
            }
            Err(err) => {
                session_record.mark_stage_failed(2);
                self.sessions.save_active(&session_record)?;
                Err(err)
            }
        }
    }

    /// Standalone Stage 3 entry point. Does not require a Stage-2
    /// artifact to be present in memory — the Report Compiler tolerates
    /// missing modules — but does require the session to exist.
    pub async fn run_stage_3(&self, session: &str) -> Result<(Session, FinalReport), StageError> {
        let mut session_record = self.sessions.load(session)?;
        session_record.mark_stage_started(3);
        self.sessions.save_active(&session_record)?;

        let started = Instant::now();
        let outcome = self.report_compiler().compile(session);
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(report) => {
                session_record.mark_stage_completed(3, elapsed);
                session_record.mark_completed();
                self.sessions.finalize(&session_record)?;
                self.progress.complete(session).await;
                Ok((session_record, report))
            }
            Err(err) => {
                session_record.mark_stage_failed(3);
                self.sessions.save_active(&session_record)?;
                Err(err)
            }
        }
    }

    /// Run all three stages in order against a fresh or existing
    /// session, persisting a per-stage record after each and recording
    /// the session as `failed` (not deleted) the moment a stage errors —
    /// its persisted state still reflects every stage that *did*
    /// complete, so a later `run_stage_N` can resume from it.
    pub async fn run_full(&self, brief: &Brief, session: Option<&str>) -> Result<PipelineResult, CoreRunError> {
        // Only a caller-supplied session id is guarded: a brand-new run
        // has no id yet, and nothing else could be racing against an id
        // that doesn't exist until this call mints it.
        let guard_key = session.map(str::to_string);
        if let Some(key) = &guard_key {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.contains(key) {
                return Err(CoreRunError::AlreadyRunning(key.clone()));
            }
            in_flight.insert(key.clone());
        }
        let result = self.run_full_inner(brief, session).await;
        if let Some(key) = &guard_key {
            self.in_flight.lock().await.remove(key);
        }
        result
    }

    async fn run_full_inner(&self, brief: &Brief, session: Option<&str>) -> Result<PipelineResult, CoreRunError> {
        let overall_start = Instant::now();
        let mut stages = Vec::new();

        let seed = self.resolve_session(brief, session).await.map_err(CoreRunError::from)?;
        let session_id = seed.id.clone();

        let (session, corpus) = match self.run_stage_1(brief, Some(&session_id)).await {
            Ok(pair) => pair,
            Err(err) => {
                stages.push(StageSummary {
                    stage: 1,
                    success: false,
                    duration_secs: 0.0,
                    detail: Some(err.to_string()),
                });
                self.record_stats(false, overall_start.elapsed().as_secs_f64()).await;
                return Ok(PipelineResult {
                    session: session_id,
                    success: false,
                    stages,
                    total_duration_secs: overall_start.elapsed().as_secs_f64(),
                });
            }
        };
        stages.push(StageSummary {
            stage: 1,
            success: true,
            duration_secs: *session.execution_times.get(&1).unwrap_or(&0.0),
            detail: Some(format!("{} total results", corpus.metadata.total_results)),
        });

        match self.run_stage_2(&session.id, None).await {
            Ok((session2, artifact)) => {
                stages.push(StageSummary {
                    stage: 2,
                    success: true,
                    duration_secs: *session2.execution_times.get(&2).unwrap_or(&0.0),
                    detail: Some(format!("expertise_level={:.1}", artifact.metrics.expertise_level)),
                });
            }
            Err(err) => {
                stages.push(StageSummary {
                    stage: 2,
                    success: false,
                    duration_secs: 0.0,
                    detail: Some(err.to_string()),
                });
                self.record_stats(false, overall_start.elapsed().as_secs_f64()).await;
                return Ok(PipelineResult {
                    session: session.id,
                    success: false,
                    stages,
                    total_duration_secs: overall_start.elapsed().as_secs_f64(),
                });
            }
        }

        let success = match self.run_stage_3(&session.id).await {
            Ok((_, report)) => {
                stages.push(StageSummary {
                    stage: 3,
                    success: true,
                    duration_secs: 0.0,
                    detail: Some(format!("{} chars", report.stats.total_chars)),
                });
                true
            }
            Err(err) => {
                stages.push(StageSummary {
                    stage: 3,
                    success: false,
                    duration_secs: 0.0,
                    detail: Some(err.to_string()),
                });
                false
            }
        };

        self.record_stats(success, overall_start.elapsed().as_secs_f64()).await;
        Ok(PipelineResult {
            session: session.id,
            success,
            stages,
            total_duration_secs: overall_start.elapsed().as_secs_f64(),
        })
    }

    async fn record_stats(&self, success: bool, duration_secs: f64) {
        self.stats.lock().await.record(success, duration_secs);
    }

    pub async fn stats(&self) -> PipelineStats {
        self.stats.lock().await.clone()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn progress(&self) -> &ProgressFabric {
        &self.progress
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn ai(&self) -> &Arc<AIAdapter> {
        &self.ai
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreRunError {
    #[error("a run is already in progress for session {0}")]
    AlreadyRunning(String),

    #[error(transparent)]
    Stage(#[from] StageError),
}

pub fn session_is_resumable(session: &Session) -> bool {
    matches!(session.status, SessionStatus::Active | SessionStatus::Failed)
}
