//! # Collaborator Interfaces
//!
//! Trait boundaries for the external streaming services the duplex voice loop
//! consumes. The core never talks to a concrete ML backend directly; production
//! clients and demo/fallback implementations both satisfy the same traits.
//!
//! ## Capability Sets:
//! - **SpeechRecognizer**: accepts audio frames, emits (text, is_final) results
//! - **TextGenerator**: accepts a conversation history, yields a lazy, finite
//!   stream of text tokens (not restartable)
//! - **SpeechSynthesizer**: accepts one sentence, yields a lazy, finite stream
//!   of PCM audio chunks (not restartable)
//! - **ProfileResolver**: one-shot session-ID-to-profile lookup used to seed
//!   personalization context at session start
//!
//! ## Suspension points:
//! Awaiting the next token or audio chunk are the cancellable suspension points
//! of a response task; collaborator streams must therefore be genuine async
//! streams rather than buffered results.

pub mod demo;

use crate::session::ChatTurn;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One speech recognition callback: interim or final text for the current utterance.
#[derive(Debug, Clone)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

/// Sink the recognizer pushes transcript events into.
///
/// Events must be emitted in recognition order; the session delivers them to
/// the client in the order received.
pub type TranscriptSink = mpsc::UnboundedSender<TranscriptEvent>;

/// Lazy, finite stream of generation tokens.
pub type TokenStream = BoxStream<'static, anyhow::Result<String>>;

/// Lazy, finite stream of synthesized PCM audio chunks.
pub type AudioChunkStream = BoxStream<'static, anyhow::Result<Vec<u8>>>;

/// Streaming speech-to-text service.
///
/// One recognizer instance serves many sessions; every call is scoped by the
/// session ID so implementations can keep per-session recognition state.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Open a recognition stream for a session. Transcript events for this
    /// session are pushed into `transcripts` until the stream is stopped.
    async fn start_streaming(&self, session_id: &str, transcripts: TranscriptSink)
        -> anyhow::Result<()>;

    /// Feed one fixed-size audio frame into the recognition stream.
    async fn send_frame(&self, session_id: &str, frame: &[u8]) -> anyhow::Result<()>;

    /// Close the recognition stream and release per-session state.
    async fn stop_streaming(&self, session_id: &str) -> anyhow::Result<()>;
}

/// Streaming text generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Stream a completion over the full conversation history.
    ///
    /// The returned stream is finite and not restartable; consuming it is the
    /// only way to observe the response.
    async fn stream_chat_completion(&self, history: &[ChatTurn]) -> anyhow::Result<TokenStream>;
}

/// Streaming text-to-speech service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one sentence into a finite stream of PCM chunks, emitted in
    /// playback order.
    async fn synthesize_stream(&self, sentence: &str) -> anyhow::Result<AudioChunkStream>;
}

/// Personalization data resolved once at session start; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: String,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// Session-identity-to-profile lookup service.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// Resolve a session identifier to a user profile, if one exists.
    async fn lookup(&self, session_id: &str) -> anyhow::Result<Option<UserProfile>>;
}

/// The full set of collaborators a session needs, shared across all sessions.
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub generator: Arc<dyn TextGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub profiles: Arc<dyn ProfileResolver>,
}
