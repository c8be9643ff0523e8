//! # Demo Collaborators
//!
//! Fallback implementations of the collaborator traits so the server runs
//! end-to-end without any external ML services. Production deployments replace
//! these at startup with real clients satisfying the same traits.
//!
//! ## Behavior:
//! - **NullRecognizer**: accepts frames and never emits a transcript
//! - **CannedGenerator**: streams a fixed reply token-by-token
//! - **SilenceSynthesizer**: emits silent PCM chunks sized to the sentence
//! - **NullProfileResolver**: resolves every session to no profile

use crate::collaborators::{
    AudioChunkStream, ProfileResolver, SpeechRecognizer, SpeechSynthesizer, TextGenerator,
    TokenStream, TranscriptSink, UserProfile,
};
use crate::session::ChatTurn;
use async_trait::async_trait;
use tracing::debug;

/// Recognizer stub that consumes audio and produces nothing.
pub struct NullRecognizer;

#[async_trait]
impl SpeechRecognizer for NullRecognizer {
    async fn start_streaming(
        &self,
        session_id: &str,
        _transcripts: TranscriptSink,
    ) -> anyhow::Result<()> {
        debug!("NullRecognizer: stream opened for session {}", session_id);
        Ok(())
    }

    async fn send_frame(&self, _session_id: &str, frame: &[u8]) -> anyhow::Result<()> {
        debug!("NullRecognizer: discarding {} byte frame", frame.len());
        Ok(())
    }

    async fn stop_streaming(&self, session_id: &str) -> anyhow::Result<()> {
        debug!("NullRecognizer: stream closed for session {}", session_id);
        Ok(())
    }
}

/// Generator that streams a fixed reply, split into word-sized tokens.
pub struct CannedGenerator {
    reply: String,
}

impl CannedGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }
}

impl Default for CannedGenerator {
    fn default() -> Self {
        Self::new("I am running in demo mode without a text generation backend. \
                   Connect a real generator to get useful answers!")
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn stream_chat_completion(&self, history: &[ChatTurn]) -> anyhow::Result<TokenStream> {
        debug!("CannedGenerator: streaming reply over {} history turns", history.len());

        // split_inclusive keeps the trailing space on each token so joining the
        // stream reproduces the reply byte-for-byte
        let tokens: Vec<String> = self
            .reply
            .split_inclusive(' ')
            .map(|t| t.to_string())
            .collect();

        Ok(Box::pin(tokio_stream::iter(tokens.into_iter().map(Ok))))
    }
}

/// Synthesizer that produces silent PCM proportional to the sentence length.
///
/// ## Chunking:
/// Emits 20 ms chunks of zero samples, roughly 50 ms of "speech" per character,
/// so downstream pacing and ordering behave like a real TTS stream.
pub struct SilenceSynthesizer {
    sample_rate: u32,
}

impl SilenceSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

#[async_trait]
impl SpeechSynthesizer for SilenceSynthesizer {
    async fn synthesize_stream(&self, sentence: &str) -> anyhow::Result<AudioChunkStream> {
        let total_ms = sentence.chars().count() as u64 * 50;
        let chunk_ms = 20u64;
        let chunk_bytes = (self.sample_rate as u64 * chunk_ms / 1000) as usize * 2;
        let chunk_count = (total_ms / chunk_ms).max(1) as usize;

        debug!(
            "SilenceSynthesizer: {} chars -> {} chunks of {} bytes",
            sentence.chars().count(),
            chunk_count,
            chunk_bytes
        );

        let chunks: Vec<anyhow::Result<Vec<u8>>> =
            (0..chunk_count).map(|_| Ok(vec![0u8; chunk_bytes])).collect();

        Ok(Box::pin(tokio_stream::iter(chunks)))
    }
}

/// Profile resolver that knows nobody.
pub struct NullProfileResolver;

#[async_trait]
impl ProfileResolver for NullProfileResolver {
    async fn lookup(&self, _session_id: &str) -> anyhow::Result<Option<UserProfile>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_canned_generator_reassembles_reply() {
        let generator = CannedGenerator::new("one two three");
        let mut stream = generator.stream_chat_completion(&[]).await.unwrap();

        let mut reply = String::new();
        while let Some(token) = stream.next().await {
            reply.push_str(&token.unwrap());
        }
        assert_eq!(reply, "one two three");
    }

    #[tokio::test]
    async fn test_silence_synthesizer_emits_fixed_size_chunks() {
        let synthesizer = SilenceSynthesizer::new(24000);
        let mut stream = synthesizer.synthesize_stream("Hello there.").await.unwrap();

        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            // 20 ms at 24 kHz 16-bit mono
            assert_eq!(chunk.len(), 960);
            assert!(chunk.iter().all(|&b| b == 0));
            chunks += 1;
        }
        // 12 chars * 50 ms / 20 ms per chunk = 30 chunks
        assert_eq!(chunks, 30);
    }

    #[tokio::test]
    async fn test_null_profile_resolver() {
        let resolver = NullProfileResolver;
        assert!(resolver.lookup("any-session").await.unwrap().is_none());
    }
}
