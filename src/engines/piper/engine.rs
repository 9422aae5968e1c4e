use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::config::PiperConfig;
use super::phonemizer;
use crate::error::EngineError;
use crate::{EngineLoader, SynthesisEngine, SynthesisParams};

/// A loaded Piper voice: ONNX session plus its training-time config.
///
/// The session is kept behind a mutex because ONNX Runtime inference takes
/// `&mut`; one engine therefore never runs two inferences at once regardless
/// of the scheduler's concurrency mode.
pub struct PiperEngine {
    session: Mutex<Session>,
    config: PiperConfig,
}

impl PiperEngine {
    /// Load a voice from its `.onnx` model and `.onnx.json` config.
    pub fn load(model_path: &Path, config_path: &Path) -> Result<Self, EngineError> {
        let config = PiperConfig::load(config_path)?;
        log::info!("Loading Piper model from {}", model_path.display());

        let session = Session::builder()
            .map_err(ort_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_err)?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(ort_err)?
            .commit_from_file(model_path)
            .map_err(ort_err)?;

        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    /// Run ONNX inference on one sentence's phoneme id sequence.
    fn infer(
        &self,
        phoneme_ids: &[i64],
        scales: [f32; 3],
        speaker: Option<u32>,
    ) -> Result<Vec<f32>, EngineError> {
        let ids = Array2::from_shape_vec((1, phoneme_ids.len()), phoneme_ids.to_vec())
            .map_err(|e| EngineError::Inference(e.to_string()))?;
        let lengths = ndarray::arr1(&[phoneme_ids.len() as i64]);
        let scales_arr = ndarray::arr1(&scales);

        let mut session = self
            .session
            .lock()
            .map_err(|_| EngineError::Inference("engine lock poisoned".to_string()))?;

        let output = if let Some(sid) = speaker {
            let sid_arr = ndarray::arr1(&[sid as i64]);
            let inputs = inputs![
                "input" => TensorRef::from_array_view(ids.view()).map_err(ort_err)?,
                "input_lengths" => TensorRef::from_array_view(lengths.view()).map_err(ort_err)?,
                "scales" => TensorRef::from_array_view(scales_arr.view()).map_err(ort_err)?,
                "sid" => TensorRef::from_array_view(sid_arr.view()).map_err(ort_err)?,
            ];
            session.run(inputs).map_err(ort_err)?
        } else {
            let inputs = inputs![
                "input" => TensorRef::from_array_view(ids.view()).map_err(ort_err)?,
                "input_lengths" => TensorRef::from_array_view(lengths.view()).map_err(ort_err)?,
                "scales" => TensorRef::from_array_view(scales_arr.view()).map_err(ort_err)?,
            ];
            session.run(inputs).map_err(ort_err)?
        };

        let first = output
            .iter()
            .next()
            .ok_or_else(|| EngineError::Inference("no output from model".to_string()))?;
        let waveform = first.1.try_extract_array::<f32>().map_err(ort_err)?;

        Ok(waveform.as_slice().unwrap_or(&[]).to_vec())
    }
}

impl SynthesisEngine for PiperEngine {
    fn synthesize(&self, text: &str, params: &SynthesisParams) -> Result<Vec<i16>, EngineError> {
        let defaults = &self.config.inference;
        let scales = [
            params.noise_scale.unwrap_or(defaults.noise_scale),
            params.length_scale.unwrap_or(defaults.length_scale),
            params.noise_w_scale.unwrap_or(defaults.noise_w),
        ];
        let speaker = if self.config.num_speakers > 1 {
            Some(params.speaker_id.unwrap_or(0))
        } else {
            None
        };
        let silence_samples = (params.sentence_silence.unwrap_or(0.0)
            * self.config.audio.sample_rate as f32) as usize;

        let mut samples = Vec::new();
        for sentence in split_sentences(text) {
            let ipa = phonemizer::phonemize(&sentence, &self.config.espeak.voice)?;
            let ids = phonemizer::phonemes_to_ids(&ipa, &self.config.phoneme_id_map);
            // Only the BOS/EOS markers — nothing to say.
            if ids.len() <= 2 {
                continue;
            }

            let audio = self.infer(&ids, scales, speaker)?;
            if !samples.is_empty() && silence_samples > 0 {
                samples.extend(std::iter::repeat(0i16).take(silence_samples));
            }
            samples.extend(float_to_pcm(&audio, params.volume));
        }

        Ok(samples)
    }
}

/// Registry loader for Piper voices.
pub struct PiperLoader;

impl EngineLoader for PiperLoader {
    fn load(
        &self,
        model_path: &Path,
        config_path: &Path,
    ) -> Result<Arc<dyn SynthesisEngine>, EngineError> {
        Ok(Arc::new(PiperEngine::load(model_path, config_path)?))
    }
}

/// Split text on sentence-terminal punctuation, keeping the terminator.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// Normalize float samples to 16-bit PCM, applying the volume multiplier.
fn float_to_pcm(samples: &[f32], volume: f32) -> Vec<i16> {
    let max_amp = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    let scale = 32767.0 / max_amp.max(0.01);

    samples
        .iter()
        .map(|s| (s * scale * volume).clamp(-32768.0, 32767.0) as i16)
        .collect()
}

fn ort_err(e: ort::Error) -> EngineError {
    EngineError::Inference(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::{float_to_pcm, split_sentences};

    #[test]
    fn splits_on_terminal_punctuation() {
        assert_eq!(
            split_sentences("One. Two! Three? Four"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
    }

    #[test]
    fn single_sentence_passes_through() {
        assert_eq!(split_sentences("Hello world"), vec!["Hello world"]);
    }

    #[test]
    fn normalizes_to_full_scale() {
        let pcm = float_to_pcm(&[0.5, -0.5, 0.25], 1.0);
        assert_eq!(pcm[0], 32767);
        assert_eq!(pcm[1], -32767);
    }

    #[test]
    fn volume_scales_and_clamps() {
        let quiet = float_to_pcm(&[0.5, -0.25], 0.5);
        assert_eq!(quiet[0], 16383);

        let loud = float_to_pcm(&[0.5, -0.5], 5.0);
        assert_eq!(loud[0], 32767);
        assert_eq!(loud[1], -32768);
    }
}
