use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use marketcore::ai::AIAdapter;
use marketcore::artifact_store::ArtifactStore;
use marketcore::brief::Brief;
use marketcore::config::{credentials_for_class, Config};
use marketcore::http_client::HttpProviderClient;
use marketcore::pipeline::PipelineOrchestrator;
use marketcore::progress::ProgressFabric;
use marketcore::provider::{CapabilityClass, ProviderEndpoint, ProviderRegistry};
use marketcore::session::SessionStore;

#[derive(Parser)]
#[command(name = "marketcore-cli")]
#[command(version, about = "Coordination core for a staged market-analysis pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run all three stages end to end for a fresh or existing session
    RunFull {
        #[arg(long)]
        segment: String,
        #[arg(long)]
        product: String,
        #[arg(long)]
        audience: String,
        #[arg(long)]
        objective: Option<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Run Stage 1 (massive collection) standalone
    RunStage1 {
        #[arg(long)]
        segment: String,
        #[arg(long)]
        product: String,
        #[arg(long)]
        audience: String,
        #[arg(long)]
        objective: Option<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Run Stage 2 (accelerated study) standalone; requires a prior Stage 1 artifact
    RunStage2 {
        #[arg(long)]
        session: String,
        #[arg(long)]
        minutes: Option<u64>,
    },
    /// Run Stage 3 (report compilation) standalone
    RunStage3 {
        #[arg(long)]
        session: String,
    },
    /// Show the persisted status of a session
    Status {
        #[arg(long)]
        session: String,
    },
    /// Drain pending progress updates for a session
    Poll {
        #[arg(long)]
        session: String,
        #[arg(long, default_value = "20")]
        max: usize,
    },
    /// Aggregate provider, AI adapter, and filesystem health
    Health,
    /// List known session ids, newest first
    List,
    /// Remove a session's active/completed/metadata records
    Delete {
        #[arg(long)]
        session: String,
    },
    /// Evict artifacts and completed sessions older than the given number of days
    Cleanup {
        #[arg(long, default_value = "30")]
        days: u64,
    },
}

async fn build_pipeline(config: &Config) -> Result<PipelineOrchestrator> {
    config.ensure_directories().context("failed to prepare artifact root")?;

    let registry = ProviderRegistry::new(config.rate_recovery);
    for class in CapabilityClass::ALL {
        let credentials = credentials_for_class(class);
        if credentials.is_empty() {
            continue;
        }
        let endpoints = credentials
            .into_iter()
            .enumerate()
            .map(|(i, credential)| {
                ProviderEndpoint::new(
                    format!("{}_{i}", class.as_str()),
                    class,
                    format!("https://api.{}.example/v1", class.as_str()),
                    credential,
                )
            })
            .collect();
        registry.register(class, endpoints).await;
    }

    let store = ArtifactStore::new(&config.artifact_root);
    let progress = ProgressFabric::new();
    let sessions = SessionStore::new(&config.artifact_root);
    let http = Arc::new(HttpProviderClient::new());
    let ai = Arc::new(AIAdapter::new(registry.clone(), http.clone()));

    Ok(PipelineOrchestrator::new(
        registry,
        store,
        progress,
        sessions,
        ai,
        http,
        config.stage1_target_bytes,
    ))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    let mut config = Config::load(&project_dir)?;
    if config.artifact_root.is_relative() {
        config.artifact_root = project_dir.join(&config.artifact_root);
    }

    let filter = if cli.verbose { "debug" } else { "info" };
    let log_dir = config.artifact_root.join("logs");
    std::fs::create_dir_all(&log_dir).context("failed to create log directory")?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "marketcore.log");
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(non_blocking.and(std::io::stdout))
        .init();

    let pipeline = build_pipeline(&config).await?;

    match cli.command {
        Commands::RunFull { segment, product, audience, objective, session } => {
            let brief = Brief { segment, product, audience, objective };
            let result = pipeline.run_full(&brief, session.as_deref()).await?;
            print_json(&result)?;
        }
        Commands::RunStage1 { segment, product, audience, objective, session } => {
            let brief = Brief { segment, product, audience, objective };
            let (session, corpus) = pipeline.run_stage_1(&brief, session.as_deref()).await?;
            print_json(&serde_json::json!({ "session": session, "corpus_summary": corpus.metadata }))?;
        }
        Commands::RunStage2 { session, minutes } => {
            let (session, artifact) = pipeline.run_stage_2(&session, minutes).await?;
            print_json(&serde_json::json!({ "session": session, "expertise": artifact.metrics }))?;
        }
        Commands::RunStage3 { session } => {
            let (session, report) = pipeline.run_stage_3(&session).await?;
            print_json(&serde_json::json!({ "session": session, "stats": report.stats }))?;
        }
        Commands::Status { session } => {
            let record = pipeline.sessions().load(&session)?;
            print_json(&record)?;
        }
        Commands::Poll { session, max } => {
            let updates = pipeline.progress().drain_updates(&session, max).await;
            print_json(&updates)?;
        }
        Commands::Health => {
            let report = marketcore::health::check(pipeline.registry(), pipeline.ai(), pipeline.store()).await;
            print_json(&report)?;
        }
        Commands::List => {
            let ids = pipeline.sessions().list_ids()?;
            print_json(&ids)?;
        }
        Commands::Delete { session } => {
            pipeline.sessions().delete(&session)?;
            println!("deleted session {session}");
        }
        Commands::Cleanup { days } => {
            let sessions_removed = pipeline.sessions().cleanup(days)?;
            let artifacts_removed = pipeline
                .store()
                .cleanup(std::time::Duration::from_secs(days * 86_400))?;
            print_json(&serde_json::json!({
                "sessions_removed": sessions_removed,
                "artifacts_removed": artifacts_removed,
            }))?;
        }
    }

    Ok(())
}
