//! Piper text-to-speech engine.
//!
//! Runs Piper ONNX voices: text is phonemized through espeak-ng, phonemes are
//! mapped to model ids via the voice config's `phoneme_id_map`, and the ONNX
//! session turns the id sequence into audio.

mod config;
mod engine;
mod phonemizer;

pub use config::PiperConfig;
pub use engine::{PiperEngine, PiperLoader};
