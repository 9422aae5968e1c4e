//! Voice discovery and lookup.
//!
//! At startup the registry scans the voices directory for paired
//! `<key>.onnx` / `<key>.onnx.json` files and builds one [`Voice`] per valid
//! pair. A pair with a missing or unparseable config, or whose engine fails to
//! load, is skipped with a warning so one broken download never takes the
//! whole service down. After `load` returns the registry is frozen and safe to
//! share across worker threads without locking.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::{EngineLoader, SynthesisEngine};

/// Locale metadata for the voices we expect to encounter.
///
/// `(locale, human-readable name, language shortcode)`. Unknown locales fall
/// back to the locale itself and its first two letters.
const LANGUAGE_MAP: &[(&str, &str, &str)] = &[
    ("en_US", "English (US)", "en"),
    ("en_GB", "English (UK)", "en"),
    ("de_DE", "German", "de"),
    ("es_ES", "Spanish", "es"),
    ("es_MX", "Spanish (Mexico)", "es"),
    ("tr_TR", "Turkish", "tr"),
    ("ru_RU", "Russian", "ru"),
    ("fa_IR", "Persian", "fa"),
    ("fr_FR", "French", "fr"),
    ("it_IT", "Italian", "it"),
    ("pt_BR", "Portuguese (Brazil)", "pt"),
    ("zh_CN", "Chinese (Mandarin)", "zh"),
    ("ar_JO", "Arabic", "ar"),
];

/// Static description of one loaded voice, as reported by `/api/voices`.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceMetadata {
    /// Voice key, e.g. `en_US-lessac-medium`
    pub id: String,
    /// Locale part of the key, e.g. `en_US`
    pub locale: String,
    /// Language shortcode, e.g. `en`
    pub language: String,
    /// Human-readable language name, e.g. `English (US)`
    pub language_name: String,
    /// Speaker name, e.g. `lessac`
    pub speaker: String,
    /// Quality tier, e.g. `medium`
    pub quality: String,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Number of speakers in the model (1 for single-speaker voices)
    pub num_speakers: u32,
}

/// The subset of a Piper model config the registry needs.
#[derive(Debug, Deserialize)]
struct VoiceModelConfig {
    audio: AudioConfig,
    #[serde(default = "default_num_speakers")]
    num_speakers: u32,
}

#[derive(Debug, Deserialize)]
struct AudioConfig {
    sample_rate: u32,
}

fn default_num_speakers() -> u32 {
    1
}

/// A loaded voice: immutable metadata plus the engine handle.
pub struct Voice {
    meta: VoiceMetadata,
    engine: Arc<dyn SynthesisEngine>,
    /// Serializes engine access when concurrent calls are not allowed.
    gate: Mutex<()>,
}

impl Voice {
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn metadata(&self) -> &VoiceMetadata {
        &self.meta
    }

    pub fn sample_rate(&self) -> u32 {
        self.meta.sample_rate
    }

    pub fn num_speakers(&self) -> u32 {
        self.meta.num_speakers
    }

    pub fn engine(&self) -> &dyn SynthesisEngine {
        self.engine.as_ref()
    }

    /// Lock guarding the engine handle for serialized access.
    pub fn gate(&self) -> &Mutex<()> {
        &self.gate
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice").field("meta", &self.meta).finish()
    }
}

/// All voices discovered at startup, in stable discovery order.
pub struct VoiceRegistry {
    voices: Vec<Arc<Voice>>,
    index: HashMap<String, usize>,
}

impl VoiceRegistry {
    /// Scan `dir` for voice model pairs and load each through `loader`.
    ///
    /// Fails only if the directory itself cannot be read; individual broken
    /// pairs are logged and skipped. An empty directory yields an empty
    /// registry — the server still starts and reports degraded health.
    pub fn load(dir: &Path, loader: &dyn EngineLoader) -> Result<Self, RegistryError> {
        let entries = std::fs::read_dir(dir).map_err(|source| RegistryError::Unreadable {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut model_paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("onnx"))
            .collect();
        // Lexicographic scan order keeps "first voice" stable across restarts.
        model_paths.sort();

        let mut voices = Vec::new();
        let mut index = HashMap::new();

        for model_path in model_paths {
            let Some(key) = model_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = key.to_string();

            let config_path = model_path.with_extension("onnx.json");
            if !config_path.exists() {
                log::warn!("Missing config for {key} — skipping");
                continue;
            }

            let config = match parse_model_config(&config_path) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Invalid config for {key}: {e} — skipping");
                    continue;
                }
            };
            if config.audio.sample_rate == 0 {
                log::warn!("Config for {key} declares sample rate 0 — skipping");
                continue;
            }

            let engine = match loader.load(&model_path, &config_path) {
                Ok(engine) => engine,
                Err(e) => {
                    log::warn!("Failed to load voice {key}: {e} — skipping");
                    continue;
                }
            };

            let meta = parse_voice_key(&key, config.audio.sample_rate, config.num_speakers);
            log::info!("Loaded voice: {} ({})", meta.id, meta.language_name);

            index.insert(key, voices.len());
            voices.push(Arc::new(Voice {
                meta,
                engine,
                gate: Mutex::new(()),
            }));
        }

        Ok(Self { voices, index })
    }

    /// Look up a voice by exact identifier.
    pub fn get(&self, id: &str) -> Option<&Arc<Voice>> {
        self.index.get(id).map(|&i| &self.voices[i])
    }

    /// All voices in discovery order.
    pub fn voices(&self) -> &[Arc<Voice>] {
        &self.voices
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }
}

fn parse_model_config(path: &Path) -> Result<VoiceModelConfig, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&content).map_err(|e| e.to_string())
}

/// Extract locale, speaker and quality from a voice key like
/// `en_US-lessac-medium`.
fn parse_voice_key(key: &str, sample_rate: u32, num_speakers: u32) -> VoiceMetadata {
    let mut parts = key.split('-');
    let locale = parts.next().unwrap_or(key).to_string();
    let speaker = parts.next().unwrap_or("default").to_string();
    let quality = parts.next().unwrap_or("unknown").to_string();

    let (language_name, language) = LANGUAGE_MAP
        .iter()
        .find(|(loc, _, _)| *loc == locale)
        .map(|&(_, name, code)| (name.to_string(), code.to_string()))
        .unwrap_or_else(|| {
            let code = locale.chars().take(2).collect::<String>().to_lowercase();
            (locale.clone(), code)
        });

    VoiceMetadata {
        id: key.to_string(),
        locale,
        language,
        language_name,
        speaker,
        quality,
        sample_rate,
        num_speakers,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::{parse_voice_key, VoiceRegistry};
    use crate::error::EngineError;
    use crate::test_support::{MockEngine, MockLoader};
    use crate::{EngineLoader, SynthesisEngine};

    fn write_voice(dir: &Path, key: &str, config: &str) {
        std::fs::write(dir.join(format!("{key}.onnx")), b"model").unwrap();
        std::fs::write(dir.join(format!("{key}.onnx.json")), config).unwrap();
    }

    const VALID_CONFIG: &str = r#"{"audio": {"sample_rate": 22050}, "num_speakers": 1}"#;

    fn mock_loader() -> MockLoader {
        MockLoader(Arc::new(MockEngine::new()))
    }

    #[test]
    fn parses_voice_key_with_known_locale() {
        let meta = parse_voice_key("en_US-lessac-medium", 22050, 1);
        assert_eq!(meta.locale, "en_US");
        assert_eq!(meta.speaker, "lessac");
        assert_eq!(meta.quality, "medium");
        assert_eq!(meta.language, "en");
        assert_eq!(meta.language_name, "English (US)");
    }

    #[test]
    fn falls_back_for_unknown_locale() {
        let meta = parse_voice_key("xx_XX-someone", 16000, 1);
        assert_eq!(meta.language, "xx");
        assert_eq!(meta.language_name, "xx_XX");
        assert_eq!(meta.speaker, "someone");
        assert_eq!(meta.quality, "unknown");
    }

    #[test]
    fn loads_pairs_and_skips_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path(), "de_DE-thorsten-medium", VALID_CONFIG);
        write_voice(dir.path(), "en_US-lessac-medium", VALID_CONFIG);
        // missing config
        std::fs::write(dir.path().join("fr_FR-siwis-low.onnx"), b"model").unwrap();
        // unparseable config
        write_voice(dir.path(), "it_IT-riccardo-low", "not json");
        // sample rate 0
        write_voice(
            dir.path(),
            "ru_RU-irina-medium",
            r#"{"audio": {"sample_rate": 0}}"#,
        );

        let registry = VoiceRegistry::load(dir.path(), &mock_loader()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("en_US-lessac-medium").is_some());
        assert!(registry.get("fr_FR-siwis-low").is_none());
        assert!(registry.get("it_IT-riccardo-low").is_none());
        assert!(registry.get("ru_RU-irina-medium").is_none());
    }

    #[test]
    fn discovery_order_is_sorted_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path(), "tr_TR-fahrettin-medium", VALID_CONFIG);
        write_voice(dir.path(), "de_DE-thorsten-medium", VALID_CONFIG);
        write_voice(dir.path(), "en_US-lessac-medium", VALID_CONFIG);

        let registry = VoiceRegistry::load(dir.path(), &mock_loader()).unwrap();
        let ids: Vec<_> = registry.voices().iter().map(|v| v.id()).collect();
        assert_eq!(
            ids,
            vec![
                "de_DE-thorsten-medium",
                "en_US-lessac-medium",
                "tr_TR-fahrettin-medium"
            ]
        );
    }

    #[test]
    fn engine_load_failure_skips_the_voice() {
        struct FailingLoader;
        impl EngineLoader for FailingLoader {
            fn load(
                &self,
                _model_path: &Path,
                _config_path: &Path,
            ) -> Result<Arc<dyn SynthesisEngine>, EngineError> {
                Err(EngineError::Inference("corrupt model".to_string()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path(), "en_US-lessac-medium", VALID_CONFIG);

        let registry = VoiceRegistry::load(dir.path(), &FailingLoader).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn unreadable_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(VoiceRegistry::load(&missing, &mock_loader()).is_err());
    }

    #[test]
    fn empty_directory_yields_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = VoiceRegistry::load(dir.path(), &mock_loader()).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }
}
