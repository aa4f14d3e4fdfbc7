//! pfi-ingest - Profile import command-line tool
//!
//! Samples a screen recording (or reads screenshots), recognizes the text,
//! merges it into deduplicated lines and optionally sends it to the parse
//! endpoint. Logs go to stderr; the result goes to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pfi_common::events::EventBus;
use pfi_ingest::services::{
    load_images, DeviceTokenProvider, FfmpegVideoSource, FileKeyStore, ProfileParseClient,
    RecognizerAdapter, TesseractRecognizer,
};
use pfi_ingest::workflow::ProgressCallback;
use pfi_ingest::{CliOverrides, ExecutionProfile, ImportOrchestrator, ImportOutcome, IngestConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for pfi-ingest
#[derive(Parser, Debug)]
#[command(name = "pfi-ingest")]
#[command(about = "Extract profile text from screen recordings and screenshots")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Folder holding the device token
    #[arg(long, global = true)]
    data_folder: Option<PathBuf>,

    /// Parse endpoint base URL
    #[arg(long, global = true)]
    sync_url: Option<String>,

    /// Images recognized concurrently
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Execution profile: foreground or constrained
    #[arg(long, global = true)]
    profile: Option<ExecutionProfile>,

    /// Longest allowed image axis in pixels
    #[arg(long, global = true)]
    max_dimension: Option<u32>,

    /// Send the merged text to the parse endpoint and print the parsed profile
    #[arg(long, global = true)]
    sync: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a screen recording
    Video {
        file: PathBuf,

        /// Seconds between sampled frames
        #[arg(long)]
        interval: Option<f64>,

        /// Maximum frames sampled
        #[arg(long)]
        max_frames: Option<u32>,
    },
    /// Import screenshots, in the order given
    Images {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        let (interval_seconds, max_frames) = match &self.command {
            Command::Video {
                interval,
                max_frames,
                ..
            } => (*interval, *max_frames),
            Command::Images { .. } => (None, None),
        };

        CliOverrides {
            data_folder: self.data_folder.clone(),
            profile: self.profile,
            interval_seconds,
            max_frames,
            max_dimension: self.max_dimension,
            concurrency: self.concurrency,
            sync_base_url: self.sync_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = pfi_common::config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the TOML level
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .init();

    info!(
        "Starting pfi-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = IngestConfig::resolve(&args.overrides(), &toml_config)?;
    info!(
        profile = %config.profile,
        max_frames = config.sampling.max_frames,
        max_dimension = config.sampling.max_dimension,
        concurrency = config.concurrency,
        "Configuration resolved"
    );

    let cancel_token = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel_token.clone()));

    let orchestrator = build_orchestrator(&config, args.sync)?;

    let outcome = match &args.command {
        Command::Video { file, .. } => {
            let video = FfmpegVideoSource::open(file)?;
            orchestrator.run_video(&video, &cancel_token).await?
        }
        Command::Images { files } => {
            let images = load_images(files)?;
            orchestrator.run_stills(images, &cancel_token).await?
        }
    };

    print_outcome(outcome)
}

fn build_orchestrator(config: &IngestConfig, sync: bool) -> Result<ImportOrchestrator> {
    let recognizer = RecognizerAdapter::new(
        Arc::new(TesseractRecognizer::new(&config.languages)),
        config.sampling.max_dimension,
    )
    .with_concurrency(config.concurrency);

    let progress: ProgressCallback = Arc::new(|p| {
        info!(
            percent = (p.value * 100.0).round() as u32,
            phase = p.label.as_deref().unwrap_or(""),
            "Progress"
        );
    });

    let mut orchestrator = ImportOrchestrator::new(EventBus::new(256), recognizer, config.sampling)
        .with_progress_callback(progress);

    if sync {
        let store = FileKeyStore::in_data_folder(&config.data_folder);
        info!(store = %store.path().display(), "Device token store");
        let tokens = Arc::new(DeviceTokenProvider::new(Arc::new(store)));
        let client = ProfileParseClient::new(config.parse_client_config()?, tokens)?;
        orchestrator = orchestrator.with_parse_client(Arc::new(client));
    }

    Ok(orchestrator)
}

fn print_outcome(outcome: ImportOutcome) -> Result<()> {
    match outcome.sync {
        None => {
            println!("{}", outcome.text);
            Ok(())
        }
        Some(Ok(profile)) => {
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(())
        }
        Some(Err(e)) => {
            // Keep the merged text usable even though the parse failed
            println!("{}", outcome.text);
            Err(e).context("Profile sync failed")
        }
    }
}

/// Cancel the running import on Ctrl+C
async fn cancel_on_ctrl_c(cancel_token: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, cancelling import");
            cancel_token.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}
