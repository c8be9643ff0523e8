//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_AUDIO_SAMPLE_RATE, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! ## Configuration Groups:
//! - **server**: bind address for the HTTP/WebSocket server
//! - **audio**: PCM format and frame slicing parameters
//! - **vad**: voice activity detection thresholds
//! - **assistant**: system prompt and sentence batching for synthesis
//! - **performance**: concurrent session limits

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, audio, vad, assistant,
/// performance) keeps each subsystem's knobs next to each other and makes the
/// config.toml layout predictable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub assistant: AssistantConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Audio format and frame slicing configuration.
///
/// ## Fields:
/// - `sample_rate`: PCM sample rate in Hz (24000 for the duplex voice pipeline)
/// - `channels`: number of audio channels (mono for voice)
/// - `bit_depth`: bits per sample (16-bit signed PCM)
/// - `frame_duration_ms`: how much audio one fixed-size frame carries; every
///   downstream consumer (VAD, STT) sees frames of exactly this duration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
    pub frame_duration_ms: u32,
}

impl AudioConfig {
    /// Size in bytes of one audio frame.
    ///
    /// ## Calculation:
    /// frame_size = sample_rate * frame_duration_ms / 1000 * channels * bytes_per_sample
    ///
    /// ## Example:
    /// 24 kHz mono 16-bit at 20 ms: 24000 * 20 / 1000 * 1 * 2 = 960 bytes
    pub fn frame_size_bytes(&self) -> usize {
        let samples_per_frame = (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000;
        samples_per_frame * self.channels as usize * (self.bit_depth as usize / 8)
    }
}

/// Voice activity detection tuning.
///
/// ## Fields:
/// - `energy_threshold`: RMS amplitude above which a frame counts as speech
///   (used by the energy fallback classifier)
/// - `silence_hangover_frames`: consecutive silence frames required before the
///   detector leaves the Speaking state; prevents flapping on short pauses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    pub energy_threshold: f32,
    pub silence_hangover_frames: u32,
}

/// Assistant behavior configuration.
///
/// ## Fields:
/// - `system_prompt`: seed system turn for every new session's history
/// - `min_sentence_chars`: minimum trimmed length before a terminated sentence
///   is flushed to synthesis; avoids synthesizing fragments like "Ok."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub system_prompt: String,
    pub min_sentence_chars: usize,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values ensure the application can start even if no configuration file
/// exists. They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8080,
            },
            audio: AudioConfig {
                sample_rate: 24000,      // 24 kHz PCM for the duplex voice loop
                channels: 1,             // Mono audio
                bit_depth: 16,           // 16-bit signed little-endian
                frame_duration_ms: 20,   // 20 ms frames (960 bytes at 24 kHz)
            },
            vad: VadConfig {
                energy_threshold: 500.0,      // RMS amplitude; well above line noise
                silence_hangover_frames: 15,  // 300 ms of silence at 20 ms frames
            },
            assistant: AssistantConfig {
                system_prompt: "You are a helpful voice assistant. Respond concisely \
                    and naturally; your answers will be spoken aloud."
                    .to_string(),
                min_sentence_chars: 3,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 32,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_AUDIO_SAMPLE_RATE=16000`: Override audio sample rate
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists)
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Handle special environment variables used by deployment platforms
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 (port 0 is reserved)
    /// - Audio parameters produce a positive, whole frame size
    /// - VAD hangover allows at least one silence frame
    /// - Session limit allows at least one session
    ///
    /// ## Why validate:
    /// Catching configuration errors at startup prevents runtime failures deep
    /// inside the audio pipeline and gives a clear message about what is wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.channels == 0 {
            return Err(anyhow::anyhow!("Audio channel count must be greater than 0"));
        }

        if self.audio.bit_depth == 0 || self.audio.bit_depth % 8 != 0 {
            return Err(anyhow::anyhow!(
                "Audio bit depth must be a positive multiple of 8, got {}",
                self.audio.bit_depth
            ));
        }

        if self.audio.frame_duration_ms == 0 {
            return Err(anyhow::anyhow!("Audio frame duration must be greater than 0 ms"));
        }

        if self.audio.frame_size_bytes() == 0 {
            return Err(anyhow::anyhow!(
                "Audio parameters produce a zero-byte frame (sample_rate {} at {} ms)",
                self.audio.sample_rate,
                self.audio.frame_duration_ms
            ));
        }

        if self.vad.silence_hangover_frames == 0 {
            return Err(anyhow::anyhow!("VAD silence hangover must be at least 1 frame"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())
    }
}
