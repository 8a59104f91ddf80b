//! sessioncore - meeting-recorder daemon entry point.
//!
//! Parses CLI flags, loads configuration, initializes logging, registers
//! the built-in event types, and runs the HTTP surface (plus, when the
//! `webrtc-streaming` feature is enabled, the WebRTC signaling path) until
//! a shutdown signal arrives.

use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use sessioncore::args::Args;
use sessioncore::config::Config;
use sessioncore::web::{self, AppState};
use tokio::sync::watch;

#[cfg(feature = "webrtc-streaming")]
use sessioncore::webrtc::SessionManager;

fn init_logging(config: &Config) {
    let level = config.logging.level.clone();
    env_logger::Builder::new()
        .parse_filters(&format!("sessioncore={level},webrtc=warn,webrtc_ice=warn"))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config);
    info!("sessioncore v{} starting", env!("CARGO_PKG_VERSION"));

    sessioncore::bus::register_builtin_types();

    let server_bind = format!("{}:{}", config.server.host, config.server.port);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let app_state = AppState::new(config.clone(), cancel_rx.clone());

    #[cfg(feature = "webrtc-streaming")]
    let webrtc_manager = if config.webrtc.enabled {
        Some(SessionManager::new(
            app_state.clone(),
            config.webrtc.clone(),
            config.server.sessions_dir.clone(),
        ))
    } else {
        None
    };
    #[cfg(not(feature = "webrtc-streaming"))]
    let webrtc_manager = None;

    let server_state = app_state.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = web::run_http_server(&server_bind, server_state, webrtc_manager).await {
            error!("http server exited with error: {}", e);
        }
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");

    let _ = cancel_tx.send(true);
    server.abort();
    app_state.snapshot_all().await;

    info!("sessioncore stopped");
    ExitCode::SUCCESS
}

/// Waits for SIGINT (Ctrl-C) or, on unix, SIGTERM — whichever arrives first.
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
