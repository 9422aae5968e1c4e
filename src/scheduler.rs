//! Bounded synthesis worker pool.
//!
//! Synthesis is CPU-bound and runs for hundreds of milliseconds per request,
//! so it must never run on the async runtime and never run unbounded. A fixed
//! set of OS worker threads pulls jobs off a bounded queue; when the queue is
//! full, `submit` fails fast with [`SynthesisError::Overloaded`] instead of
//! queuing without limit.
//!
//! Engine handles are not assumed thread-safe: by default a per-voice gate
//! serializes engine access even across workers. Set
//! [`SchedulerConfig::engine_concurrent`] when the engine is known to tolerate
//! concurrent calls, which relaxes the constraint to pool-level bounding only.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tokio::sync::oneshot;

use crate::error::SynthesisError;
use crate::registry::Voice;
use crate::{PcmAudio, SynthesisParams};

/// Highest accepted volume multiplier.
const MAX_VOLUME: f32 = 5.0;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Jobs allowed to wait in the queue; submissions beyond this fail fast.
    pub queue_depth: usize,
    /// Deadline per job, measured from submission.
    pub job_timeout: Duration,
    /// Allow concurrent synthesize calls on one voice's engine handle.
    pub engine_concurrent: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 32,
            job_timeout: Duration::from_secs(60),
            engine_concurrent: false,
        }
    }
}

/// One unit of scheduled work: text + parameters + resolved voice.
struct SynthesisJob {
    voice: Arc<Voice>,
    text: String,
    params: SynthesisParams,
    reply: oneshot::Sender<Result<PcmAudio, SynthesisError>>,
}

/// Handle to the worker pool. Cheap to clone; all clones feed one queue.
#[derive(Clone)]
pub struct SynthesisScheduler {
    queue: Sender<SynthesisJob>,
    job_timeout: Duration,
}

impl SynthesisScheduler {
    /// Spawn the worker threads and return the submission handle.
    pub fn start(config: SchedulerConfig) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<SynthesisJob>(config.queue_depth);

        for i in 0..config.workers.max(1) {
            let rx = rx.clone();
            let engine_concurrent = config.engine_concurrent;
            thread::Builder::new()
                .name(format!("synth-{i}"))
                .spawn(move || worker_loop(rx, engine_concurrent))?;
        }

        Ok(Self {
            queue: tx,
            job_timeout: config.job_timeout,
        })
    }

    /// Run one synthesis job to completion.
    ///
    /// Validates the numeric parameters first — invalid values are rejected
    /// before they occupy a queue slot. A full queue fails immediately with
    /// [`SynthesisError::Overloaded`]; a job that misses its deadline returns
    /// [`SynthesisError::Timeout`]. The engine call itself is not cancellable:
    /// on timeout the worker that owns the job stays unavailable until the
    /// call returns. Failed jobs are never retried here.
    pub async fn submit(
        &self,
        voice: Arc<Voice>,
        text: String,
        params: SynthesisParams,
    ) -> Result<PcmAudio, SynthesisError> {
        validate_params(&params, &voice)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = SynthesisJob {
            voice,
            text,
            params,
            reply: reply_tx,
        };

        self.queue.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => SynthesisError::Overloaded,
            TrySendError::Disconnected(_) => SynthesisError::PoolClosed,
        })?;

        match tokio::time::timeout(self.job_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SynthesisError::PoolClosed),
            Err(_) => Err(SynthesisError::Timeout(self.job_timeout)),
        }
    }
}

fn worker_loop(queue: Receiver<SynthesisJob>, engine_concurrent: bool) {
    while let Ok(job) = queue.recv() {
        let started = Instant::now();
        let result = run_job(&job, engine_concurrent);

        match &result {
            Ok(audio) => log::debug!(
                "Synthesized {:.2}s audio for voice {} in {:.2?} (text length {})",
                audio.duration_secs(),
                job.voice.id(),
                started.elapsed(),
                job.text.chars().count(),
            ),
            Err(e) => log::error!(
                "Synthesis failed for voice {} (text length {}, params {:?}): {e}",
                job.voice.id(),
                job.text.chars().count(),
                job.params,
            ),
        }

        // The caller may have timed out and dropped the receiver.
        let _ = job.reply.send(result);
    }
}

fn run_job(job: &SynthesisJob, engine_concurrent: bool) -> Result<PcmAudio, SynthesisError> {
    let samples = if engine_concurrent {
        job.voice.engine().synthesize(&job.text, &job.params)?
    } else {
        let _guard = job
            .voice
            .gate()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        job.voice.engine().synthesize(&job.text, &job.params)?
    };

    Ok(PcmAudio {
        samples,
        sample_rate: job.voice.sample_rate(),
    })
}

fn validate_params(params: &SynthesisParams, voice: &Voice) -> Result<(), SynthesisError> {
    let scales = [
        ("length_scale", params.length_scale),
        ("noise_scale", params.noise_scale),
        ("noise_w_scale", params.noise_w_scale),
        ("sentence_silence", params.sentence_silence),
    ];
    for (name, value) in scales {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(SynthesisError::Validation(format!(
                    "{name} must be a finite value >= 0, got {v}"
                )));
            }
        }
    }

    if !params.volume.is_finite() || params.volume < 0.0 || params.volume > MAX_VOLUME {
        return Err(SynthesisError::Validation(format!(
            "volume must be between 0.0 and {MAX_VOLUME}, got {}",
            params.volume
        )));
    }

    if let Some(sid) = params.speaker_id {
        if sid >= voice.num_speakers() {
            return Err(SynthesisError::Validation(format!(
                "speaker_id {sid} out of range for voice '{}' ({} speaker(s))",
                voice.id(),
                voice.num_speakers()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::{SchedulerConfig, SynthesisScheduler};
    use crate::error::SynthesisError;
    use crate::registry::{Voice, VoiceRegistry};
    use crate::test_support::{MockEngine, MockLoader};
    use crate::SynthesisParams;

    /// One-voice registry (22050 Hz) backed by the given engine.
    fn voice_backed_by(engine: Arc<MockEngine>) -> Arc<Voice> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en_US-lessac-medium.onnx"), b"model").unwrap();
        std::fs::write(
            dir.path().join("en_US-lessac-medium.onnx.json"),
            r#"{"audio": {"sample_rate": 22050}, "num_speakers": 1}"#,
        )
        .unwrap();
        let registry = VoiceRegistry::load(dir.path(), &MockLoader(engine)).unwrap();
        registry.get("en_US-lessac-medium").unwrap().clone()
    }

    fn scheduler(workers: usize, queue_depth: usize, timeout: Duration) -> SynthesisScheduler {
        SynthesisScheduler::start(SchedulerConfig {
            workers,
            queue_depth,
            job_timeout: timeout,
            engine_concurrent: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn submit_returns_audio_at_voice_sample_rate() {
        let engine = Arc::new(MockEngine::new());
        let voice = voice_backed_by(engine.clone());
        let scheduler = scheduler(2, 8, Duration::from_secs(5));

        let audio = scheduler
            .submit(voice, "Hello world".to_string(), SynthesisParams::default())
            .await
            .unwrap();

        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.samples.len(), "Hello world".chars().count());
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn invalid_params_never_reach_the_engine() {
        let engine = Arc::new(MockEngine::new());
        let voice = voice_backed_by(engine.clone());
        let scheduler = scheduler(1, 4, Duration::from_secs(5));

        let bad = [
            SynthesisParams {
                length_scale: Some(-1.0),
                ..Default::default()
            },
            SynthesisParams {
                noise_scale: Some(f32::NAN),
                ..Default::default()
            },
            SynthesisParams {
                sentence_silence: Some(f32::INFINITY),
                ..Default::default()
            },
            SynthesisParams {
                volume: 9.0,
                ..Default::default()
            },
            SynthesisParams {
                speaker_id: Some(3),
                ..Default::default()
            },
        ];

        for params in bad {
            let result = scheduler
                .submit(voice.clone(), "hi".to_string(), params)
                .await;
            assert!(matches!(result, Err(SynthesisError::Validation(_))));
        }
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn excess_submissions_fail_with_overloaded() {
        let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(400)));
        let voice = voice_backed_by(engine.clone());
        let scheduler = scheduler(1, 1, Duration::from_secs(5));

        // First job occupies the single worker, second the single queue slot.
        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            let voice = voice.clone();
            async move {
                scheduler
                    .submit(voice, "one".to_string(), SynthesisParams::default())
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = tokio::spawn({
            let scheduler = scheduler.clone();
            let voice = voice.clone();
            async move {
                scheduler
                    .submit(voice, "two".to_string(), SynthesisParams::default())
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Pool and queue are both full now; this must fail fast, not block.
        let started = Instant::now();
        let third = scheduler
            .submit(voice.clone(), "three".to_string(), SynthesisParams::default())
            .await;
        assert!(matches!(third, Err(SynthesisError::Overloaded)));
        assert!(started.elapsed() < Duration::from_millis(200));

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn slow_job_times_out() {
        let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(400)));
        let voice = voice_backed_by(engine);
        let scheduler = scheduler(1, 4, Duration::from_millis(50));

        let result = scheduler
            .submit(voice, "slow".to_string(), SynthesisParams::default())
            .await;
        assert!(matches!(result, Err(SynthesisError::Timeout(_))));
    }

    #[tokio::test]
    async fn engine_failure_is_reported_not_retried() {
        let engine = Arc::new(MockEngine::failing());
        let voice = voice_backed_by(engine.clone());
        let scheduler = scheduler(1, 4, Duration::from_secs(5));

        let result = scheduler
            .submit(voice, "hi".to_string(), SynthesisParams::default())
            .await;
        assert!(matches!(result, Err(SynthesisError::Engine(_))));
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn same_voice_engine_is_never_entered_concurrently_by_default() {
        let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(50)));
        let voice = voice_backed_by(engine.clone());
        let scheduler = scheduler(4, 16, Duration::from_secs(5));

        let jobs: Vec<_> = (0..4)
            .map(|i| {
                let scheduler = scheduler.clone();
                let voice = voice.clone();
                tokio::spawn(async move {
                    scheduler
                        .submit(voice, format!("job {i}"), SynthesisParams::default())
                        .await
                })
            })
            .collect();
        for job in jobs {
            assert!(job.await.unwrap().is_ok());
        }

        assert_eq!(engine.max_concurrency(), 1);
        assert_eq!(engine.call_count(), 4);
    }

    #[tokio::test]
    async fn identical_requests_produce_identical_shapes() {
        let engine = Arc::new(MockEngine::new());
        let voice = voice_backed_by(engine);
        let scheduler = scheduler(2, 8, Duration::from_secs(5));

        let a = scheduler
            .submit(
                voice.clone(),
                "Same text".to_string(),
                SynthesisParams::default(),
            )
            .await
            .unwrap();
        let b = scheduler
            .submit(
                voice.clone(),
                "Same text".to_string(),
                SynthesisParams::default(),
            )
            .await
            .unwrap();

        assert_eq!(a.samples.len(), b.samples.len());
        assert_eq!(a.sample_rate, b.sample_rate);
    }
}
