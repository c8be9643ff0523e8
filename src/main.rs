//! # Voice Agent Backend - Main Application Entry Point
//!
//! Real-time duplex voice server: clients stream microphone audio over a
//! WebSocket and hear the assistant talk back, with live transcripts, barge-in
//! interruption, and widget pushes along the way.
//!
//! ## Application Architecture:
//! - **config**: application configuration (TOML file + environment variables)
//! - **protocol**: WebSocket wire messages
//! - **audio**: frame slicing and voice activity detection
//! - **collaborators**: trait boundaries for STT / generation / TTS / profiles
//! - **session**: per-connection state, transcript routing, response
//!   orchestration, widget extraction
//! - **websocket**: the connection actor tying it all together
//! - **health**: liveness endpoint
//! - **error**: custom error types and HTTP error responses

mod audio;
mod collaborators;
mod config;
mod error;
mod health;
mod protocol;
mod session;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collaborators::demo::{CannedGenerator, NullProfileResolver, NullRecognizer, SilenceSynthesizer};
use collaborators::Collaborators;

/// Global shutdown flag set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-agent-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!(
        "Audio format: {} Hz, {} ms frames ({} bytes)",
        config.audio.sample_rate,
        config.audio.frame_duration_ms,
        config.audio.frame_size_bytes()
    );

    // Demo collaborator set: deterministic local fallbacks with the same trait
    // surface production backends plug into
    info!("Running with demo collaborators (no external ML backends configured)");
    let collaborators = Collaborators {
        recognizer: Arc::new(NullRecognizer),
        generator: Arc::new(CannedGenerator::default()),
        synthesizer: Arc::new(SilenceSynthesizer::new(config.audio.sample_rate)),
        profiles: Arc::new(NullProfileResolver),
    };

    let app_state = AppState::new(config.clone(), collaborators);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/ws/voice", web::get().to(websocket::voice_websocket))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Race the server against the shutdown signal
    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize structured logging.
///
/// `RUST_LOG` controls the filter; the default keeps this crate at debug and
/// actix-web at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_agent_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM / SIGINT and set the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag until it is set.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
