//! Piper voice config (`<voice>.onnx.json`).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

/// The parts of a Piper voice config the engine consumes. Unknown fields are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct PiperConfig {
    pub audio: AudioConfig,
    #[serde(default)]
    pub espeak: EspeakConfig,
    #[serde(default)]
    pub inference: InferenceDefaults,
    /// Phoneme character → model id sequence.
    #[serde(default)]
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
    #[serde(default = "default_num_speakers")]
    pub num_speakers: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakConfig {
    /// espeak-ng voice used for phonemization, e.g. `en-us`.
    #[serde(default = "default_espeak_voice")]
    pub voice: String,
}

impl Default for EspeakConfig {
    fn default() -> Self {
        Self {
            voice: default_espeak_voice(),
        }
    }
}

/// Synthesis defaults baked into the voice at training time; request
/// parameters override them per call.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceDefaults {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

impl Default for InferenceDefaults {
    fn default() -> Self {
        Self {
            noise_scale: default_noise_scale(),
            length_scale: default_length_scale(),
            noise_w: default_noise_w(),
        }
    }
}

fn default_espeak_voice() -> String {
    "en-us".to_string()
}

fn default_num_speakers() -> u32 {
    1
}

fn default_noise_scale() -> f32 {
    0.667
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_noise_w() -> f32 {
    0.8
}

impl PiperConfig {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::PiperConfig;

    #[test]
    fn parses_a_realistic_config() {
        let json = r#"{
            "audio": {"sample_rate": 22050, "quality": "medium"},
            "espeak": {"voice": "en-us"},
            "inference": {"noise_scale": 0.667, "length_scale": 1.0, "noise_w": 0.8},
            "phoneme_id_map": {"^": [1], "$": [2], "_": [0], "a": [26]},
            "num_speakers": 1,
            "phoneme_type": "espeak",
            "dataset": "lessac"
        }"#;
        let config: PiperConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.audio.sample_rate, 22050);
        assert_eq!(config.espeak.voice, "en-us");
        assert_eq!(config.num_speakers, 1);
        assert_eq!(config.phoneme_id_map["a"], vec![26]);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: PiperConfig =
            serde_json::from_str(r#"{"audio": {"sample_rate": 16000}}"#).unwrap();
        assert_eq!(config.espeak.voice, "en-us");
        assert_eq!(config.inference.noise_scale, 0.667);
        assert_eq!(config.inference.length_scale, 1.0);
        assert_eq!(config.inference.noise_w, 0.8);
        assert_eq!(config.num_speakers, 1);
        assert!(config.phoneme_id_map.is_empty());
    }
}
