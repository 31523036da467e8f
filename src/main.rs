//! fafosnap
//!
//! Full-page screenshot service: an HTTP server by default, or a one-shot
//! batch run writing PNG files.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use fafosnap::browser::{BrowserConfig, ChromeEngine};
use fafosnap::capture::{CaptureOptions, CaptureOrchestrator};
use fafosnap::config::Config;
use fafosnap::handlers::{app, AppState};
use fafosnap::output::ScreenshotWriter;
use fafosnap::pipeline::{Dispatcher, DispatcherHandle, DispatcherOptions, RequestAggregator};
use tracing_subscriber::EnvFilter;

/// Full-page screenshot service
#[derive(Parser, Debug)]
#[command(name = "fafosnap")]
#[command(version)]
#[command(about = "Capture full-page screenshots through a retrying worker pool")]
struct Args {
    /// JSON config file (default: ./config.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides serverPort)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to Chrome/Chromium executable
    #[arg(long, global = true)]
    chrome_path: Option<String>,

    /// Run Chromium without its sandbox
    #[arg(long, global = true)]
    no_sandbox: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Capture URLs once and write screenshot-NNN.png files
    Batch {
        /// URLs to capture (default: defaultUrls from the config)
        urls: Vec<String>,

        /// Directory for the PNG files
        #[arg(short, long, default_value = "screenshots")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(path) = args.chrome_path {
        config.chrome_path = Some(path);
    }
    if args.no_sandbox {
        config.sandbox = false;
    }

    let engine = Arc::new(ChromeEngine::new(BrowserConfig::from_service_config(&config)));
    let orchestrator = Arc::new(CaptureOrchestrator::new(engine, CaptureOptions::from_config(&config)));
    let dispatcher = Dispatcher::start(DispatcherOptions::from_config(&config), orchestrator);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, dispatcher).await,
        Command::Batch { urls, out_dir } => batch(&config, dispatcher, urls, out_dir).await,
    }
}

async fn serve(config: &Config, dispatcher: Dispatcher) -> anyhow::Result<()> {
    let aggregator = RequestAggregator::new(
        dispatcher.handle(),
        config.effective_max_urls(),
        config.request_timeout(1),
    );
    let state = Arc::new(AppState::new(aggregator, dispatcher.options().worker_count));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("fafosnap listening on http://{}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(dispatcher.handle()))
        .await
        .context("server error")?;

    dispatcher.shutdown().await;
    Ok(())
}

async fn batch(
    config: &Config,
    dispatcher: Dispatcher,
    urls: Vec<String>,
    out_dir: PathBuf,
) -> anyhow::Result<()> {
    let urls = if urls.is_empty() {
        config.default_urls.clone()
    } else {
        urls
    };
    if urls.is_empty() {
        bail!("no URLs given and defaultUrls is empty");
    }

    let writer = ScreenshotWriter::create(&out_dir).await?;
    let aggregator = RequestAggregator::new(dispatcher.handle(), urls.len(), config.request_timeout(1));
    let outcome = aggregator.capture_batch(urls).await;
    dispatcher.shutdown().await;

    let results = outcome?;
    let report = writer.write_all(&results).await;
    tracing::info!(
        "Batch finished: {} written to {}, {} failed",
        report.written(),
        writer.dir().display(),
        report.failed()
    );

    if !report.all_written() {
        bail!("{} of {} screenshots failed", report.failed(), report.entries.len());
    }
    Ok(())
}

async fn shutdown_signal(jobs: DispatcherHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, draining in-flight captures");
    jobs.close();
}
