use clap::{Parser, Subcommand};
use segmentation::api::{self, AppState, ServeError};
use segmentation::importer::{ImportError, ImportOutcome, Importer};
use segmentation::sap_client::{SapClient, SapError};
use segmentation::store::{self, StoreError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

mod config;
mod logging;

use config::Config;

/// Synchronizes SAP segmentation records into a local database and serves them over HTTP.
#[derive(Parser)]
#[command(name = "segmentationd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file. Environment variables override its values.
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the HTTP API, optionally importing once at startup
    Serve,
    /// Run a single import and exit
    Import,
}

#[derive(thiserror::Error, Debug)]
enum SegmentationdError {
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Metrics(#[from] shared::metrics::MetricsError),
    #[error("could not open storage: {0}")]
    Store(#[from] StoreError),
    #[error("could not build SAP client: {0}")]
    Client(#[from] SapError),
    #[error("import failed: {0}")]
    Import(#[from] ImportError),
    #[error("server error: {0}")]
    Serve(#[from] ServeError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("segmentationd: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Keep the guard alive so Sentry flushes on exit
    let _sentry = match logging::init(&config.env, &config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("segmentationd: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::cleanup_old_logs(
        &config.logging.dir,
        &config.logging.file_name,
        config.logging.cleanup_max_age_days,
    ) {
        tracing::error!(error = %e, "failed to clean up old logs");
    }

    match run(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "segmentationd failed");
            ExitCode::FAILURE
        }
    }
}

fn run(command: CliCommand, config: Config) -> Result<(), SegmentationdError> {
    if let Some(metrics) = &config.metrics {
        shared::metrics::init_statsd(&metrics.statsd_host, metrics.statsd_port, "segmentation")?;
        shared::metrics_defs::describe_all(segmentation::metrics_defs::ALL_METRICS);
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        match command {
            CliCommand::Serve => serve(config).await,
            CliCommand::Import => import(config).await,
        }
    })
}

async fn build_importer(
    config: &Config,
) -> Result<(Arc<Importer>, Arc<dyn store::SegmentationStore>), SegmentationdError> {
    let store = store::connect(&config.storage).await?;
    let client = SapClient::new(&config.connection, &config.import)?;
    let importer = Arc::new(Importer::new(Arc::new(client), store.clone()));
    Ok((importer, store))
}

async fn serve(config: Config) -> Result<(), SegmentationdError> {
    let (importer, store) = build_importer(&config).await?;

    if config.import.on_startup {
        let importer = importer.clone();
        tokio::spawn(async move {
            match importer.run_once().await {
                Ok(outcome) => log_outcome(outcome),
                Err(e) => tracing::error!(error = %e, "startup import failed"),
            }
        });
    }

    let state = AppState::new(importer, store);
    api::serve(config.listener, state, shutdown_signal()).await?;

    tracing::info!("segmentationd stopped");
    Ok(())
}

async fn import(config: Config) -> Result<(), SegmentationdError> {
    let (importer, _store) = build_importer(&config).await?;
    let outcome = importer.run_once().await?;
    log_outcome(outcome);
    Ok(())
}

fn log_outcome(outcome: ImportOutcome) {
    match outcome {
        ImportOutcome::NothingToImport => tracing::info!("no segmentation data to import"),
        ImportOutcome::Imported { count, origin } => {
            tracing::info!(count, ?origin, "segmentation import finished")
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining connections");
}
