//! locus-tts-server: HTTP API for multilingual speech synthesis and voice cloning.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use locus_tts::config::ServiceConfig;
use locus_tts::server::{create_router, AppState};
use locus_tts::service::TtsService;

#[derive(Debug, Parser)]
#[command(
    name = "locus-tts-server",
    about = "Multilingual text-to-speech and voice cloning server",
    version
)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "LOCUS_TTS_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overriding the configuration
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the configuration
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!("Starting locus-tts server");

    let config = ServiceConfig::load(args.config.as_deref())
        .and_then(|config| config.with_bind(args.host, args.port))
        .context("failed to load configuration")?;
    config
        .ensure_dirs()
        .context("failed to create working directories")?;
    log::info!("Models directory: {}", config.models_dir.display());

    let load_config = config.clone();
    let service = tokio::task::spawn_blocking(move || TtsService::load(&load_config))
        .await
        .context("model loading task failed")?
        .context("failed to load models")?;
    let state = AppState::new(service, &config);

    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("Server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => log::info!("Received SIGTERM, shutting down..."),
    }
}
