//! # piper-serve
//!
//! An HTTP text-to-speech server for Piper voice models.
//!
//! ## Features
//!
//! - **Voice discovery**: scans a directory of `.onnx` + `.onnx.json` pairs at
//!   startup and serves every valid voice it finds
//! - **Bounded synthesis pool**: a fixed number of worker threads runs the
//!   CPU-bound engine, with backpressure instead of unbounded queuing
//! - **WAV output**: every request returns a complete, standard WAV file
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! piper-serve = { version = "0.1", features = ["piper"] }
//! ```
//!
//! ```bash
//! VOICES_DIR=/voices piper-serve --port 10200
//! curl 'localhost:10200/api/tts?text=Hello+world' -o hello.wav
//! ```

pub mod config;
pub mod engines;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod server;
pub mod wav;

use std::path::Path;
use std::sync::Arc;

use crate::error::EngineError;

/// The result of a synthesis (text-to-speech) operation.
///
/// Contains mono 16-bit signed PCM samples and the sample rate of the output
/// audio.
#[derive(Debug, Clone)]
pub struct PcmAudio {
    /// Raw audio samples as signed 16-bit values
    pub samples: Vec<i16>,
    /// Sample rate of the audio in Hz
    pub sample_rate: u32,
}

impl PcmAudio {
    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Numeric knobs for one synthesis request.
///
/// Every field except `volume` is optional; absent values fall back to the
/// engine's own defaults (for Piper voices, the `inference` block of the model
/// config).
#[derive(Debug, Clone)]
pub struct SynthesisParams {
    /// Speaker index for multi-speaker models.
    pub speaker_id: Option<u32>,
    /// Speech speed — <1.0 = faster, >1.0 = slower.
    pub length_scale: Option<f32>,
    /// Phoneme noise.
    pub noise_scale: Option<f32>,
    /// Phoneme width noise.
    pub noise_w_scale: Option<f32>,
    /// Silence inserted between sentences, in seconds.
    pub sentence_silence: Option<f32>,
    /// Output volume multiplier. Accepted range: 0.0–5.0.
    pub volume: f32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            speaker_id: None,
            length_scale: None,
            noise_scale: None,
            noise_w_scale: None,
            sentence_silence: None,
            volume: 1.0,
        }
    }
}

/// Common interface for text-to-speech synthesis engines.
///
/// Engine handles are shared across the scheduler's worker threads, so
/// implementations must be `Send + Sync` and manage any interior mutability
/// themselves. Unless [`crate::scheduler::SchedulerConfig::engine_concurrent`]
/// is set, the scheduler additionally serializes calls per voice.
pub trait SynthesisEngine: Send + Sync {
    /// Synthesize speech from the given text.
    ///
    /// Returns mono 16-bit PCM samples at the engine's native sample rate.
    fn synthesize(&self, text: &str, params: &SynthesisParams) -> Result<Vec<i16>, EngineError>;
}

/// Constructs an engine handle from an on-disk model pair.
///
/// This is the seam between the registry scan and the concrete engine: the
/// `piper` feature supplies an ONNX-backed loader, tests supply mocks.
pub trait EngineLoader {
    /// Load the engine for one voice from its `.onnx` model and JSON config.
    fn load(
        &self,
        model_path: &Path,
        config_path: &Path,
    ) -> Result<Arc<dyn SynthesisEngine>, EngineError>;
}
