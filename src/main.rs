//! DICOM media exporter
//!
//! Walks a tree of DICOM studies and converts every readable study into a
//! video (multi-frame) or still image (single frame), mirroring the input
//! tree under the media directory. Each converted study's attributes are
//! appended to a JSON-Lines metadata file.

mod cli;
mod config;
mod config_file;
mod discovery;
mod encode;
mod error;
mod ffmpeg;
mod ledger;
mod output;
mod scheduler;
mod study;
mod transform;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::config::Config;
use crate::config_file::ConfigFile;
use crate::error::{ExportError, Result};
use crate::ledger::LedgerWriter;
use crate::scheduler::RunSummary;
use crate::transform::MediaTransformer;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "dicom-media-export";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    match run(cli).await {
        Ok(summary) => {
            summary.log();
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Everything up to opening the ledger is fatal; after that, per-file
/// failures end up in the summary.
async fn run(cli: Cli) -> Result<RunSummary> {
    let file = ConfigFile::from_file(&cli.config)?;
    let config = file.clone().into_config(cli.overwrite);
    tracing::info!("Configuration loaded: {:?}", config);
    config.validate()?;

    ffmpeg::init()?;
    encode::ensure_encoder_available(&config.video.encoder)?;

    let ledger = open_ledger(&file, &config)?;
    let ledger_path = ledger.path().to_path_buf();

    let files = discovery::discover_files(&config.input.dir, config.input.recursive);

    let transformer = Arc::new(MediaTransformer::new(&config, ledger.handle()?));
    let summary = scheduler::run(files, transformer, config.num_workers).await;

    let recorded = tokio::task::spawn_blocking(move || ledger.finish())
        .await
        .map_err(|e| ExportError::Ledger(format!("Writer shutdown failed: {}", e)))??;
    tracing::info!("Wrote {} records to {:?}", recorded, ledger_path);
    if recorded as usize != summary.recorded() {
        tracing::warn!(
            "{} files were converted but {} records were written",
            summary.recorded(),
            recorded
        );
    }

    Ok(summary)
}

/// Open the ledger, then save the configuration copy. A refused ledger
/// leaves the copy of the run that wrote it in place.
fn open_ledger(file: &ConfigFile, config: &Config) -> Result<LedgerWriter> {
    let ledger = LedgerWriter::open(&config.metadata.file, config.metadata.mode)?;

    if let Some(copy) = &config.config_copy {
        file.to_file(copy)?;
        tracing::info!("Saved configuration copy to {:?}", copy);
    }
    Ok(ledger)
}

/// Initialize logging with tracing
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "dicom_media_export=debug"
    } else {
        "dicom_media_export=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
