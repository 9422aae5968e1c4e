//! HTTP facade.
//!
//! Parses requests, runs them through resolution and the scheduler, and maps
//! every pipeline failure onto a structured JSON response. Nothing in here
//! crashes the process: each error is recovered at this boundary.
//!
//! Routes:
//! - `GET  /health`     — readiness + loaded voice summary
//! - `GET  /api/voices` — metadata for every loaded voice
//! - `POST /api/tts`    — synthesize speech (JSON body) → WAV audio
//! - `GET  /api/tts`    — synthesize speech (query params) → WAV audio

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::SynthesisError;
use crate::registry::{VoiceMetadata, VoiceRegistry};
use crate::resolver;
use crate::scheduler::SynthesisScheduler;
use crate::{wav, SynthesisParams};

/// Everything a request handler needs, constructed once at startup.
pub struct AppState {
    pub registry: Arc<VoiceRegistry>,
    pub scheduler: SynthesisScheduler,
    pub default_voice: String,
    pub max_text_length: usize,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/voices", get(list_voices))
        .route("/api/tts", get(tts_get).post(tts_post))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A pipeline failure mapped onto an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn internal(detail: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<SynthesisError> for ApiError {
    fn from(err: SynthesisError) -> Self {
        let status = match &err {
            SynthesisError::Validation(_) => StatusCode::BAD_REQUEST,
            SynthesisError::VoiceNotFound(_) => StatusCode::NOT_FOUND,
            SynthesisError::Overloaded | SynthesisError::PoolClosed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SynthesisError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SynthesisError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response();
        if self.status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub voices_loaded: usize,
    pub available_voices: Vec<String>,
    pub default_voice: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.registry.is_empty() {
            "no_voices"
        } else {
            "ok"
        },
        voices_loaded: state.registry.len(),
        available_voices: state
            .registry
            .voices()
            .iter()
            .map(|v| v.id().to_string())
            .collect(),
        default_voice: state.default_voice.clone(),
    })
}

async fn list_voices(State(state): State<Arc<AppState>>) -> Json<Vec<VoiceMetadata>> {
    Json(
        state
            .registry
            .voices()
            .iter()
            .map(|v| v.metadata().clone())
            .collect(),
    )
}

/// Synthesis request, accepted both as a JSON body and as query parameters.
#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    /// Text to synthesize
    pub text: String,
    /// Exact voice key, e.g. `de_DE-thorsten-medium`
    #[serde(default)]
    pub voice: Option<String>,
    /// Language shortcode, e.g. `de`, `en`, `es`
    #[serde(default)]
    pub language: Option<String>,
    /// Multi-speaker voice index
    #[serde(default)]
    pub speaker_id: Option<u32>,
    /// Speed — <1.0 = faster, >1.0 = slower
    #[serde(default)]
    pub length_scale: Option<f32>,
    /// Phoneme noise
    #[serde(default)]
    pub noise_scale: Option<f32>,
    /// Phoneme width noise
    #[serde(default)]
    pub noise_w_scale: Option<f32>,
    /// Silence between sentences, seconds
    #[serde(default)]
    pub sentence_silence: Option<f32>,
    /// Output volume multiplier
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_volume() -> f32 {
    1.0
}

async fn tts_post(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TtsRequest>,
) -> Result<Response, ApiError> {
    synthesize(&state, req).await
}

async fn tts_get(
    State(state): State<Arc<AppState>>,
    Query(req): Query<TtsRequest>,
) -> Result<Response, ApiError> {
    synthesize(&state, req).await
}

async fn synthesize(state: &AppState, req: TtsRequest) -> Result<Response, ApiError> {
    validate_text(&req.text, state.max_text_length)?;

    let voice = resolver::resolve(
        &state.registry,
        req.voice.as_deref(),
        req.language.as_deref(),
        &state.default_voice,
    )?;
    let voice_id = voice.id().to_string();

    let params = SynthesisParams {
        speaker_id: req.speaker_id,
        length_scale: req.length_scale,
        noise_scale: req.noise_scale,
        noise_w_scale: req.noise_w_scale,
        sentence_silence: req.sentence_silence,
        volume: req.volume,
    };

    let audio = state.scheduler.submit(voice, req.text, params).await?;
    let bytes = wav::package(&audio.samples, audio.sample_rate)
        .map_err(|e| ApiError::internal(format!("failed to package audio: {e}")))?;

    let mut response = (StatusCode::OK, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("inline; filename=\"tts.wav\""),
    );
    if let Ok(value) = HeaderValue::from_str(&voice_id) {
        headers.insert(HeaderName::from_static("x-voice"), value);
    }
    Ok(response)
}

/// Reject empty or over-length text before any resolution or scheduling work.
fn validate_text(text: &str, max_len: usize) -> Result<(), ApiError> {
    let len = text.chars().count();
    if len == 0 {
        return Err(SynthesisError::Validation("text must not be empty".to_string()).into());
    }
    if len > max_len {
        return Err(SynthesisError::Validation(format!(
            "text length {len} exceeds maximum of {max_len}"
        ))
        .into());
    }
    Ok(())
}
