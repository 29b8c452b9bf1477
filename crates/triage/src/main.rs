//! Triage daemon: wires the queue, store, pipeline and HTTP API together.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use triage::analyzer::{HeuristicReasoner, LogAnalyzer};
use triage::config::{SafetyPolicy, TriageConfig};
use triage::detector::MetricAnomalyDetector;
use triage::gather::{ContextGatherer, StaticTelemetrySource, TelemetrySource};
use triage::observe::TracingSink;
use triage::pipeline::TriagePipeline;
use triage::planner::RemediationPlanner;
use triage::queue::{AlertQueue, FileQueue, InMemoryQueue};
use triage::retriever::{IncidentRetriever, InMemoryIncidentIndex};
use triage::server::{build_router, AppState};
use triage::store::{FileStore, InMemoryStore, TriageStore};
use triage::synthetic::SyntheticAlertGenerator;
use triage::validator::SafetyValidator;
use triage::worker::{Ingestor, TriageWorker};

#[derive(Parser)]
#[command(name = "triaged", about = "Infrastructure alert triage daemon")]
struct Args {
    /// Bind address for the HTTP API
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Bind port for the HTTP API
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Directory for the file-backed queue and store. Omit for purely
    /// in-memory operation.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Number of worker loops draining the queue
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Ingestion queue capacity
    #[arg(long, default_value_t = 256)]
    queue_capacity: usize,

    /// Minimum planner confidence for auto-approval
    #[arg(long, default_value_t = 0.7)]
    auto_approve_threshold: f64,

    /// Maximum blast radius eligible for auto-approval
    #[arg(long, default_value_t = 5)]
    max_blast_radius: u32,

    /// Services that always require approval (repeatable)
    #[arg(long = "critical-service")]
    critical_services: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("triage=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();

    let config = TriageConfig {
        queue_capacity: args.queue_capacity,
        workers: args.workers.max(1),
        safety: SafetyPolicy {
            auto_approve_threshold: args.auto_approve_threshold,
            max_blast_radius: args.max_blast_radius,
            critical_services: args.critical_services.clone(),
        },
        ..TriageConfig::default()
    };

    let (queue, store): (Arc<dyn AlertQueue>, Arc<dyn TriageStore>) = match &args.data_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "using file-backed queue and store");
            (
                Arc::new(FileQueue::open(dir, config.queue_capacity).await?),
                Arc::new(FileStore::open(dir).await?),
            )
        }
        None => (
            Arc::new(InMemoryQueue::new(config.queue_capacity)),
            Arc::new(InMemoryStore::new()),
        ),
    };

    let telemetry: Arc<dyn TelemetrySource> = Arc::new(StaticTelemetrySource::new());
    let pipeline = Arc::new(TriagePipeline::new(
        ContextGatherer::new(telemetry, config.timeouts.gather, config.context_lookback),
        LogAnalyzer::new(Arc::new(HeuristicReasoner::new()), config.timeouts.reasoning),
        MetricAnomalyDetector::new(config.detector.clone())
            .context("invalid detector configuration")?,
        IncidentRetriever::new(
            Arc::new(InMemoryIncidentIndex::with_seed_corpus()),
            config.incident_top_k,
            config.timeouts.retrieval,
        ),
        RemediationPlanner::new(config.planner.clone()),
        SafetyValidator::new(config.safety.clone()),
        Arc::new(TracingSink),
    ));

    let shutdown = CancellationToken::new();
    let mut worker_handles = Vec::with_capacity(config.workers);
    for worker_id in 0..config.workers {
        let worker = TriageWorker::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::clone(&pipeline),
            shutdown.clone(),
        );
        worker_handles.push(tokio::spawn(worker.run(worker_id)));
    }

    let state = Arc::new(AppState {
        ingestor: Ingestor::new(Arc::clone(&queue), Arc::clone(&store)),
        store,
        generator: SyntheticAlertGenerator::new(),
    });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, workers = config.workers, "triage daemon listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            serve_shutdown.cancel();
        })
        .await
        .context("server error")?;

    info!("waiting for workers to drain");
    shutdown.cancel();
    let _ = tokio::time::timeout(
        Duration::from_secs(5),
        futures::future::join_all(worker_handles),
    )
    .await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            signal.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
