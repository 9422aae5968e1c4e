//! Error taxonomy for the synthesis pipeline.
//!
//! Each boundary owns one enum: [`RegistryError`] for the startup scan (the
//! only process-fatal condition), [`EngineError`] for the opaque synthesis
//! capability, and [`SynthesisError`] for everything a request can run into on
//! its way to audio. The HTTP facade maps `SynthesisError` variants onto
//! status codes in [`crate::server`].

use std::path::PathBuf;
use std::time::Duration;

/// Failure to initialize the voice registry at startup.
///
/// Per-voice problems (missing config, parse failure, engine load failure) are
/// logged and skipped during the scan and never surface here; only an
/// unreadable voices directory aborts startup.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("cannot read voices directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure inside a synthesis engine.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("phonemization failed: {0}")]
    Phonemizer(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid model config: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one synthesis request.
#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    /// Malformed request input. Never reaches the worker pool.
    #[error("{0}")]
    Validation(String),
    /// Voice resolution failed. The message names the missing identifier or
    /// language and lists the available alternatives.
    #[error("{0}")]
    VoiceNotFound(String),
    /// The job queue is at capacity. Retryable.
    #[error("synthesis queue is full, try again later")]
    Overloaded,
    /// The job did not finish within the configured deadline. The worker that
    /// owns it stays busy until the engine call returns.
    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),
    /// The worker pool is gone. Only seen during shutdown.
    #[error("synthesis pool is not running")]
    PoolClosed,
    /// The engine rejected or failed an otherwise valid job.
    #[error("synthesis failed: {0}")]
    Engine(#[from] EngineError),
}
