//! Runtime configuration.
//!
//! Every knob is a CLI flag with an environment-variable fallback, so the
//! server works equally well from a shell and from a container manifest.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "piper-serve")]
#[command(about = "HTTP text-to-speech server for Piper voice models")]
pub struct ServerConfig {
    /// Directory containing voice models (.onnx + .onnx.json pairs)
    #[arg(long, default_value = "/voices", env = "VOICES_DIR")]
    pub voices_dir: PathBuf,

    /// Voice used when a request names neither a voice nor a language
    #[arg(long, default_value = "en_US-lessac-medium", env = "DEFAULT_VOICE")]
    pub default_voice: String,

    /// Maximum accepted text length, in characters
    #[arg(long, default_value = "5000", env = "MAX_TEXT_LENGTH")]
    pub max_text_length: usize,

    /// Number of synthesis worker threads
    #[arg(long, default_value = "4", env = "SYNTH_WORKERS")]
    pub workers: usize,

    /// Jobs allowed to wait for a worker before requests are rejected as busy
    #[arg(long, default_value = "32", env = "SYNTH_QUEUE_DEPTH")]
    pub queue_depth: usize,

    /// Per-job synthesis deadline, in seconds
    #[arg(long, default_value = "60", env = "SYNTH_TIMEOUT_SECS")]
    pub synthesis_timeout_secs: u64,

    /// Allow concurrent synthesis calls on the same voice engine.
    ///
    /// Off by default: engine handles are not proven thread-safe, so access is
    /// serialized per voice.
    #[arg(long, env = "ENGINE_CONCURRENT")]
    pub engine_concurrent: bool,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value = "10200", env = "PORT")]
    pub port: u16,
}

impl ServerConfig {
    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            voices_dir: PathBuf::from("/voices"),
            default_voice: "en_US-lessac-medium".to_string(),
            max_text_length: 5000,
            workers: 4,
            queue_depth: 32,
            synthesis_timeout_secs: 60,
            engine_concurrent: false,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 10200,
        }
    }
}
