pub mod admin;
pub mod bridge;
pub mod metrics;
pub mod sensing;
pub mod settings;
pub mod status;
pub mod summary;
pub mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use admin::AdminState;
use bridge::{FfmpegCamera, TelegramChannel, TesseractOcr};
use metrics::MetricsCollector;
use sensing::{Bridges, SensingController};
use settings::SettingsStore;
use status::RunStatus;

#[derive(Debug, Parser)]
#[command(
    name = "smartslide",
    about = "Detects slide changes, summarizes them and posts them to Telegram"
)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, default_value = "configs/config.json")]
    config: PathBuf,
}

/// Process entry point. Any error returned from here happened before the
/// capture loop could start and is fatal.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    utils::logging::init();

    info!("SmartSlide starting up...");

    let settings = Arc::new(SettingsStore::new(cli.config.clone())?);
    let config = settings.current();
    info!("config loaded from {}", settings.path().display());

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!("Failed to create output dir {}", config.output_dir.display())
    })?;
    let metrics = MetricsCollector::open(config.metrics_path())?;
    info!("metrics appended to {}", metrics.path().display());

    let camera = FfmpegCamera::open(config.camera_index).await?;
    let ocr = TesseractOcr::new(config.tesseract_lang.clone())
        .await
        .context("OCR engine unavailable")?;
    info!("tesseract ready (lang {})", ocr.lang());
    let telegram = TelegramChannel::new(&config.telegram_bot_token, config.telegram_chat_id)?;

    let shutdown = CancellationToken::new();
    let status = RunStatus::new();
    let mut sensing = SensingController::new(&shutdown);

    let admin_addr = config.admin_socket_addr()?;
    let listener = TcpListener::bind(admin_addr)
        .await
        .with_context(|| format!("Failed to bind admin HTTP on {admin_addr}"))?;
    let admin_server = tokio::spawn(admin::serve(
        listener,
        AdminState {
            status: status.clone(),
            settings: Arc::clone(&settings),
            metrics: metrics.clone(),
            control: sensing.control(),
        },
        shutdown.clone(),
    ));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    sensing.start(
        settings,
        status,
        metrics,
        Bridges {
            source: Box::new(camera),
            recognizer: Arc::new(ocr),
            delivery: Arc::new(telegram),
        },
    )?;
    let loop_result = sensing.join().await;

    // A Stop command ends the loop without touching the token.
    shutdown.cancel();
    match admin_server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("admin server exited with error: {err:#}"),
        Err(err) => warn!("admin server task failed to join: {err}"),
    }

    info!("SmartSlide stopped");
    loop_result
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
