//! # Transcript Router
//!
//! Consumes the recognizer's transcript events for one session and decides
//! what each one means for the conversation:
//!
//! - **Every** event (interim and final) is forwarded to the client as a
//!   `transcript` message, so the UI can render live captions
//! - A **final, non-empty** transcript additionally becomes a user turn and
//!   starts a new response task, superseding any task still in flight
//! - A final whose text trims to empty is forwarded but starts nothing
//!
//! Supersession goes through [`Session::replace_response_task`], which aborts
//! and awaits the old task before installing the new one, so two finals in
//! quick succession can never run concurrent responses.

use crate::collaborators::{SpeechSynthesizer, TextGenerator, TranscriptEvent};
use crate::error::VoiceError;
use crate::protocol::ServerMessage;
use crate::session::orchestrator;
use crate::session::{Role, Session};

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Routes one session's transcript events to the client and the orchestrator.
pub struct TranscriptRouter {
    session: Arc<Session>,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    min_sentence_chars: usize,
}

impl TranscriptRouter {
    pub fn new(
        session: Arc<Session>,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        min_sentence_chars: usize,
    ) -> Self {
        Self {
            session,
            generator,
            synthesizer,
            min_sentence_chars,
        }
    }

    /// Handle one transcript event from the recognizer.
    pub async fn on_transcript(&self, event: TranscriptEvent) -> Result<(), VoiceError> {
        // Forward everything, interim and final alike
        self.session.send(ServerMessage::Transcript {
            text: event.text.clone(),
            is_final: event.is_final,
        })?;

        if !event.is_final {
            return Ok(());
        }

        let text = event.text.trim();
        if text.is_empty() {
            debug!(session_id = %self.session.id, "dropping empty final transcript");
            return Ok(());
        }

        // Appended before the task starts, so the task's history snapshot
        // includes this turn and ordering matches real-world turn order
        self.session.append_turn(Role::User, text.to_string());

        let session = self.session.clone();
        let generator = self.generator.clone();
        let synthesizer = self.synthesizer.clone();
        let min_chars = self.min_sentence_chars;
        self.session
            .replace_response_task(move || {
                orchestrator::spawn_response(session, generator, synthesizer, min_chars)
            })
            .await;

        Ok(())
    }

    /// Drain transcript events until the recognizer's channel closes or the
    /// client transport goes away.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<TranscriptEvent>) {
        while let Some(event) = rx.recv().await {
            match self.on_transcript(event).await {
                Ok(()) => {}
                Err(VoiceError::TransportClosed) => {
                    debug!(session_id = %self.session.id, "transcript router stopping: transport closed");
                    break;
                }
                Err(err) => {
                    error!(session_id = %self.session.id, "transcript routing failed: {}", err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FrameBuffer;
    use crate::collaborators::demo::{CannedGenerator, SilenceSynthesizer};
    use crate::collaborators::{SpeechRecognizer, TranscriptSink};
    use crate::protocol::Outbound;
    use crate::session::ChatTurn;
    use async_trait::async_trait;

    fn router() -> (TranscriptRouter, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new("s-1", tx, "system"));
        let router = TranscriptRouter::new(
            session,
            Arc::new(CannedGenerator::default()),
            Arc::new(SilenceSynthesizer::new(24_000)),
            3,
        );
        (router, rx)
    }

    fn event(text: &str, is_final: bool) -> TranscriptEvent {
        TranscriptEvent {
            text: text.to_string(),
            is_final,
        }
    }

    #[tokio::test]
    async fn test_interim_is_forwarded_but_starts_nothing() {
        let (router, mut rx) = router();

        router.on_transcript(event("hel", false)).await.unwrap();

        match rx.try_recv().unwrap() {
            Outbound::Message(ServerMessage::Transcript { text, is_final }) => {
                assert_eq!(text, "hel");
                assert!(!is_final);
            }
            other => panic!("unexpected outbound item: {:?}", other),
        }
        assert!(!router.session.is_responding());
        assert_eq!(router.session.history_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_final_is_forwarded_but_dropped() {
        let (router, mut rx) = router();

        router.on_transcript(event("   ", true)).await.unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            Outbound::Message(ServerMessage::Transcript { .. })
        ));
        assert!(!router.session.is_responding());
        assert_eq!(router.session.history_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_final_appends_user_turn_and_responds() {
        let (router, mut rx) = router();

        router.on_transcript(event("hello there", true)).await.unwrap();

        // Await the spawned response so history and outbound are settled
        router.session.cancel_response_task().await;

        let history = router.session.history_snapshot();
        let user_turns: Vec<&ChatTurn> = history
            .iter()
            .filter(|turn| turn.role == Role::User)
            .collect();
        assert_eq!(user_turns.len(), 1);
        assert_eq!(user_turns[0].content, "hello there");

        // The forwarded transcript comes before anything the response emits
        assert!(matches!(
            rx.try_recv().unwrap(),
            Outbound::Message(ServerMessage::Transcript { .. })
        ));
    }

    /// Recognizer that emits a final "hello" for every frame it receives.
    #[derive(Default)]
    struct OneUtteranceRecognizer {
        sink: std::sync::Mutex<Option<TranscriptSink>>,
    }

    #[async_trait]
    impl SpeechRecognizer for OneUtteranceRecognizer {
        async fn start_streaming(
            &self,
            _session_id: &str,
            transcripts: TranscriptSink,
        ) -> anyhow::Result<()> {
            *self.sink.lock().unwrap() = Some(transcripts);
            Ok(())
        }

        async fn send_frame(&self, _session_id: &str, _frame: &[u8]) -> anyhow::Result<()> {
            if let Some(sink) = self.sink.lock().unwrap().as_ref() {
                let _ = sink.send(TranscriptEvent {
                    text: "hello".to_string(),
                    is_final: true,
                });
            }
            Ok(())
        }

        async fn stop_streaming(&self, _session_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// One full utterance through the whole pipeline: network bytes slice into
    /// exactly one frame, the recognizer's final starts a response, and the
    /// client sees `transcript`, `ai_transcript`, audio chunks, `ai_complete`,
    /// in that order.
    #[tokio::test]
    async fn test_single_utterance_outbound_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new("s-1", tx, "system"));
        let router = TranscriptRouter::new(
            session,
            Arc::new(CannedGenerator::new("Hi there.")),
            Arc::new(SilenceSynthesizer::new(24_000)),
            3,
        );

        // Inbound half: chunks that do not align with the frame boundary
        let recognizer = OneUtteranceRecognizer::default();
        let (transcript_tx, mut transcript_rx) = mpsc::unbounded_channel();
        recognizer.start_streaming("s-1", transcript_tx).await.unwrap();

        let mut frames = FrameBuffer::new(4).unwrap();
        let mut forwarded = 0;
        for chunk in [&[1u8, 2][..], &[3, 4, 5][..]] {
            for frame in frames.ingest(chunk) {
                recognizer.send_frame("s-1", &frame).await.unwrap();
                forwarded += 1;
            }
        }
        assert_eq!(forwarded, 1, "five bytes must produce exactly one frame");
        assert_eq!(frames.pending_bytes(), 1);

        let event = transcript_rx.recv().await.unwrap();
        assert_eq!(event.text, "hello");
        assert!(event.is_final);

        router.on_transcript(event).await.unwrap();

        // Outbound half: drain until the turn completes
        let mut kinds = Vec::new();
        loop {
            match rx.recv().await.expect("transport closed before ai_complete") {
                Outbound::Message(ServerMessage::Transcript { text, is_final }) => {
                    assert_eq!(text, "hello");
                    assert!(is_final);
                    kinds.push("transcript");
                }
                Outbound::Message(ServerMessage::AiTranscript { text, .. }) => {
                    assert_eq!(text, "Hi there.");
                    kinds.push("ai_transcript");
                }
                Outbound::Audio(_) => kinds.push("audio"),
                Outbound::Message(ServerMessage::AiComplete) => {
                    kinds.push("ai_complete");
                    break;
                }
                Outbound::Message(other) => panic!("unexpected message: {:?}", other),
            }
        }

        assert_eq!(kinds[0], "transcript");
        assert_eq!(kinds[1], "ai_transcript");
        assert!(kinds.len() > 3, "no audio between sentence text and completion");
        assert!(kinds[2..kinds.len() - 1].iter().all(|k| *k == "audio"));
        assert_eq!(*kinds.last().unwrap(), "ai_complete");
    }

    /// Two finals in a row leave exactly one completed response: the second
    /// supersedes the first.
    #[tokio::test]
    async fn test_second_final_supersedes_first() {
        let (router, _rx) = router();

        router.on_transcript(event("first utterance", true)).await.unwrap();
        router.on_transcript(event("second utterance", true)).await.unwrap();

        router.session.cancel_response_task().await;

        let history = router.session.history_snapshot();
        let users: Vec<&str> = history
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(users, vec!["first utterance", "second utterance"]);
    }
}
