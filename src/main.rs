use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use piper_serve::config::ServerConfig;
use piper_serve::engines::piper::PiperLoader;
use piper_serve::registry::VoiceRegistry;
use piper_serve::scheduler::{SchedulerConfig, SynthesisScheduler};
use piper_serve::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ServerConfig::parse();

    let registry = VoiceRegistry::load(&config.voices_dir, &PiperLoader)?;
    if registry.is_empty() {
        log::warn!(
            "No voices loaded! Place .onnx + .onnx.json files in {}",
            config.voices_dir.display()
        );
    } else {
        log::info!(
            "Ready — {} voice(s): {}",
            registry.len(),
            registry
                .voices()
                .iter()
                .map(|v| v.id())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    log::info!(
        "Engine access: {}",
        if config.engine_concurrent {
            "pool-level bounding only"
        } else {
            "serialized per voice"
        }
    );

    let scheduler = SynthesisScheduler::start(SchedulerConfig {
        workers: config.workers,
        queue_depth: config.queue_depth,
        job_timeout: config.synthesis_timeout(),
        engine_concurrent: config.engine_concurrent,
    })?;

    let state = Arc::new(AppState {
        registry: Arc::new(registry),
        scheduler,
        default_voice: config.default_voice.clone(),
        max_text_length: config.max_text_length,
    });

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{addr}");
    axum::serve(listener, server::router(state)).await?;

    Ok(())
}
