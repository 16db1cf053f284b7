//! # Roundtable Backend - Main Application Entry Point
//!
//! WebSocket backend orchestrating live panel conversations between
//! LLM-driven personas with synthesized speech and synchronized captions.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML + environment variables)
//! - **state**: process-wide service context and the live-meeting registry
//! - **websocket**: per-session actor validating and dispatching events
//! - **meeting**: the per-meeting orchestration state machine
//! - **generation**: opaque LLM capability (history + persona → utterance)
//! - **synthesis** / **audio**: speech providers, bounded task queue,
//!   multi-chunk merging and caption timing
//! - **persistence**: MongoDB document store and atomic id allocation
//! - **retry** / **error** / **reporting**: failure taxonomy and handling

mod audio;
mod broadcast;
mod config;
mod error;
mod generation;
mod meeting;
mod middleware;
mod persistence;
mod pronunciation;
mod reporting;
mod retry;
mod state;
mod synthesis;
mod text;
mod websocket;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::audio::probe::SymphoniaProbe;
use crate::audio::AudioSystem;
use crate::config::AppConfig;
use crate::generation::OpenAiGenerator;
use crate::meeting::{MeetingDeps, RoundRobinPolicy};
use crate::persistence::{MeetingStore, MongoMeetingStore};
use crate::state::AppState;
use crate::synthesis::elevenlabs::ElevenLabsSynthesizer;
use crate::synthesis::openai::OpenAiSynthesizer;
use crate::synthesis::SynthesizerRegistry;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    // Uncaught faults report and exit; supervision restarts us
    reporting::install_panic_hook();

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting roundtable-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{} ({:?} mode)",
        config.server.host, config.server.port, config.server.mode
    );

    let app_state = build_state(&config).await?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let state_for_server = app_state.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state_for_server.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::RequestLogging)
            .route("/ws/meeting", web::get().to(websocket::meeting_websocket))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

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
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Build the process-wide service context: one store handle, one provider
/// client each, one audio system. Everything downstream borrows from here
/// instead of reaching for globals.
async fn build_state(config: &AppConfig) -> Result<AppState> {
    let store = Arc::new(
        MongoMeetingStore::connect(&config.database.uri, &config.database.name).await?,
    );
    // Benign if another instance won the bootstrap race
    store.ensure_counter().await?;

    let generator = Arc::new(OpenAiGenerator::new(&config.providers)?);

    let probe = Arc::new(SymphoniaProbe);
    let synthesizers = SynthesizerRegistry::new(
        Arc::new(ElevenLabsSynthesizer::new(
            config.providers.elevenlabs_api_key.clone(),
            config.providers.request_timeout_secs,
        )?),
        Arc::new(OpenAiSynthesizer::new(
            config.providers.llm_api_base.clone(),
            config.providers.openai_tts_api_key.clone(),
            config.providers.request_timeout_secs,
            probe.clone(),
        )?),
    );

    let audio = AudioSystem::start(
        synthesizers,
        store.clone() as Arc<dyn MeetingStore>,
        probe,
        config.meeting.audio_concurrency,
    );

    let deps = MeetingDeps {
        store,
        generator,
        audio,
        policy: Arc::new(RoundRobinPolicy),
    };

    Ok(AppState::new(config.clone(), deps))
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roundtable_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolve when the process is asked to stop (SIGTERM or SIGINT).
async fn shutdown_signal() {
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
}
