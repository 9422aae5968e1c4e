//! Maps a synthesis request onto exactly one voice.
//!
//! Precedence, first match wins:
//! 1. explicit voice identifier — must match exactly, otherwise the request
//!    fails (no silent fallback to language or default)
//! 2. language shortcode or locale, case-insensitive, first match in
//!    discovery order
//! 3. the configured default voice, if loaded
//! 4. the first voice in discovery order
//!
//! An empty registry fails every path.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::SynthesisError;
use crate::registry::{Voice, VoiceRegistry};

/// Resolve `voice` / `language` against the registry.
pub fn resolve(
    registry: &VoiceRegistry,
    voice: Option<&str>,
    language: Option<&str>,
    default_voice: &str,
) -> Result<Arc<Voice>, SynthesisError> {
    if registry.is_empty() {
        return Err(SynthesisError::VoiceNotFound(
            "no voices loaded on server".to_string(),
        ));
    }

    if let Some(id) = voice {
        return registry.get(id).cloned().ok_or_else(|| {
            SynthesisError::VoiceNotFound(format!(
                "voice '{id}' not found; available: {}",
                available_ids(registry)
            ))
        });
    }

    if let Some(lang) = language {
        let lang = lang.trim().to_lowercase();
        return registry
            .voices()
            .iter()
            .find(|v| {
                let meta = v.metadata();
                meta.language == lang || meta.locale.to_lowercase() == lang
            })
            .cloned()
            .ok_or_else(|| {
                SynthesisError::VoiceNotFound(format!(
                    "no voice for language '{lang}'; available: {}",
                    available_languages(registry)
                ))
            });
    }

    if let Some(voice) = registry.get(default_voice) {
        return Ok(voice.clone());
    }

    // Registry is non-empty, checked above.
    registry
        .voices()
        .first()
        .cloned()
        .ok_or_else(|| SynthesisError::VoiceNotFound("no voices loaded on server".to_string()))
}

fn available_ids(registry: &VoiceRegistry) -> String {
    registry
        .voices()
        .iter()
        .map(|v| v.id().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn available_languages(registry: &VoiceRegistry) -> String {
    registry
        .voices()
        .iter()
        .map(|v| v.metadata().language.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ")
}
