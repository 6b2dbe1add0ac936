//! Jewelry AR Mirror
//!
//! Main entry point for the streaming server.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jewelry_mirror::{config::Config, error::WebError, web::WebServer, AppState};
use jewelry_mirror::Result as MirrorResult;

/// Jewelry AR Mirror - streams facial anchors for AR jewelry try-on
#[derive(Parser, Debug)]
#[command(name = "jewelry-mirror", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera device index (overrides config)
    #[arg(long)]
    camera: Option<u32>,

    /// HTTP server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// HTTP server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", jewelry_mirror::NAME, jewelry_mirror::VERSION);

    let config = load_config(&args)?;
    let state = AppState::new(config);

    let signal_state = Arc::clone(&state);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_state.shutdown();
    });

    if let Err(e) = run_http_server(Arc::clone(&state)).await {
        error!("HTTP server error: {}", e);
        return Err(e.into());
    }

    // Give sessions a moment to release their cameras
    tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;

    info!("Jewelry AR Mirror stopped");
    Ok(())
}

/// Load config, then apply environment and CLI overrides.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    config.apply_env_overrides()?;

    if let Some(camera) = args.camera {
        config.camera.device_id = camera;
    }
    if let Some(ref host) = args.host {
        config.http.host = host.clone();
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }

    config.validate()?;

    info!(
        "Camera {}: {}x{} @ {} fps",
        config.camera.device_id, config.camera.width, config.camera.height, config.camera.fps
    );
    info!(
        "Detector: {} (max_faces: {}, detection: {}, tracking: {})",
        config.detector.program,
        config.detector.max_faces,
        config.detector.min_detection_confidence,
        config.detector.min_tracking_confidence
    );

    Ok(config)
}

async fn run_http_server(state: Arc<AppState>) -> MirrorResult<()> {
    let http_config = state.config.read().await.http.clone();

    let web_server = WebServer::new(Arc::clone(&state), &http_config);
    let app = web_server.router();

    let addr = format!("{}:{}", http_config.host, http_config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WebError::Bind(format!("{}: {}", addr, e)))?;

    info!("HTTP server listening on http://{}", addr);
    info!("WebSocket endpoint: ws://{}/ws/landmarks", addr);
    info!("Health check: http://{}/health", addr);

    let mut shutdown_rx = state.subscribe_shutdown();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| WebError::Serve(e.to_string()))?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
