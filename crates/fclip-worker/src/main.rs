//! Batch clip assembly worker binary.
//!
//! Usage:
//!   fclip-worker [batch.json]
//!   fclip-worker --proposal <proposal.json> --source <ref> --owner <user>/<project>
//!
//! A batch file of `-` (or none) reads the batch request from stdin. The
//! batch result is printed to stdout as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fclip_media::{progress, reap_stale_files, FfmpegConfig, FfmpegRenderer};
use fclip_models::{BatchRenderRequest, Owner, RenderOptions, SourceRef};
use fclip_storage::R2Client;
use fclip_worker::metrics as worker_metrics;
use fclip_worker::{proposal_to_batch, BatchOrchestrator, WorkerConfig};

const DEFAULT_LOG_DIRECTIVES: &str = "fclip_worker=info,fclip_media=info,fclip_storage=info";

#[derive(Parser, Debug)]
#[command(name = "fclip-worker", version, about = "Render a batch of clips from one source video")]
struct Cli {
    /// Batch request JSON; `-` or omitted reads stdin.
    #[arg(conflicts_with = "proposal")]
    batch: Option<PathBuf>,

    /// Clip proposal JSON to render instead of a batch request.
    #[arg(long, requires_all = ["source", "owner"])]
    proposal: Option<PathBuf>,

    /// Source for the proposal: a local path, an http(s) URL, or `stored:<key>`.
    #[arg(long, requires = "proposal")]
    source: Option<String>,

    /// Owner of the published clips, as `<user>/<project>`.
    #[arg(long, requires = "proposal")]
    owner: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider was already installed");
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production.
    // Logs go to stderr; stdout carries the batch result.
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    match run(cli).await {
        Ok(all_succeeded) => {
            if !all_succeeded {
                std::process::exit(2);
            }
        }
        Err(e) => {
            error!("Worker failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    info!("Starting fclip-worker");
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        worker_metrics::init_metrics(addr)?;
        info!(%addr, "Prometheus exporter listening");
    }

    match reap_stale_files(&config.work_dir, config.temp_ttl).await {
        Ok(report) => {
            worker_metrics::record_reaped(report.removed);
            if report.removed > 0 {
                info!(removed = report.removed, "Reaped stale work files");
            }
        }
        Err(e) => warn!("Failed to reap work directory: {}", e),
    }

    let request = load_request(cli).await?;

    let ffmpeg = FfmpegConfig::from_env()
        .context("FFmpeg is not available")?
        .with_timeout(config.render_timeout);
    let store = R2Client::from_env().context("R2 storage is not configured")?;

    let (progress_tx, mut progress_rx) = progress::channel(config.progress_capacity);
    tokio::spawn(async move {
        while let Some(p) = progress_rx.recv().await {
            debug!(clip_id = %p.clip_id, percent = p.percent, speed = p.speed, "Render progress");
        }
    });

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling batch");
            cancel_tx.send(true).ok();
        }
    });

    let orchestrator = BatchOrchestrator::new(
        config,
        Arc::new(FfmpegRenderer::new(ffmpeg)),
        Arc::new(store),
    )
    .with_progress(progress_tx);

    let result = orchestrator.run_with_cancel(request, cancel_rx).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.all_succeeded())
}

async fn load_request(cli: Cli) -> anyhow::Result<BatchRenderRequest> {
    let Some(proposal) = cli.proposal else {
        let path = cli.batch.filter(|p| p.as_path() != Path::new("-"));
        let text = read_input(path.as_deref()).await?;
        return serde_json::from_str(&text).context("Invalid batch request JSON");
    };

    let text = read_input(Some(proposal.as_path())).await?;
    let source: SourceRef = cli
        .source
        .ok_or_else(|| anyhow!("--source is required with --proposal"))?
        .parse()?;
    let owner = cli
        .owner
        .ok_or_else(|| anyhow!("--owner is required with --proposal"))?;
    let (user_id, project_id) = owner
        .split_once('/')
        .ok_or_else(|| anyhow!("--owner must be <user>/<project>"))?;
    let request = proposal_to_batch(
        &text,
        source,
        Owner::new(user_id, project_id),
        RenderOptions::default(),
        "clip",
    )?;
    Ok(request)
}

async fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            Ok(text)
        }
    }
}
