//! # Response Orchestrator
//!
//! Owns the single cancellable task that turns a final transcript into a
//! spoken response: stream generation tokens, batch them into sentences, run
//! each sentence through synthesis, and forward the audio to the client in
//! order.
//!
//! ## Algorithm (one task per invocation):
//! 1. Mark the session as responding
//! 2. Stream tokens from the generator over the full history
//! 3. Flush complete sentences: `ai_transcript` message, then every synthesized
//!    chunk in production order, before the next sentence starts. Sentences
//!    never overlap, so audio ordering is preserved
//! 4. Flush the remaining buffer after the token stream ends
//! 5. Append the full response as an assistant turn
//! 6. Dispatch widget triggers asynchronously
//! 7. Send `ai_complete`
//! 8. Clear the responding flag in guaranteed cleanup (completion, cancellation,
//!    or error)
//!
//! ## Cancellation:
//! The task body runs inside a `futures` `Abortable`; barge-in and supersession
//! abort it, which takes effect at the next suspension point (awaiting a token
//! or an audio chunk). An aborted task skips steps 5–7 and is not a failure.
//!
//! ## Failure semantics:
//! A collaborator error terminates the task after logging: the client simply
//! receives no further output for that turn and the session stays usable.

use crate::collaborators::{SpeechSynthesizer, TextGenerator};
use crate::error::{VoiceError, VoiceResult};
use crate::protocol::ServerMessage;
use crate::session::widget;
use crate::session::{ResponseTask, Role, Session};

use futures_util::future::{AbortHandle, Abortable};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters that end a sentence for synthesis batching.
const SENTENCE_TERMINATORS: [char; 4] = ['.', '!', '?', '\n'];

/// Accumulates generation tokens and yields synthesis-sized sentences.
///
/// A sentence is flushed when the buffer contains a terminator and the trimmed
/// text up to it is at least `min_chars` long; shorter fragments keep
/// accumulating past their terminator so the synthesizer never gets stubs.
pub struct SentenceBuffer {
    buf: String,
    min_chars: usize,
}

impl SentenceBuffer {
    pub fn new(min_chars: usize) -> Self {
        Self {
            buf: String::new(),
            min_chars,
        }
    }

    /// Append one token and drain every sentence it completed, in order.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buf.push_str(token);

        let mut sentences = Vec::new();
        let mut search_from = 0;

        while let Some(rel) = self.buf[search_from..].find(SENTENCE_TERMINATORS) {
            // Terminators are all single-byte, so idx + 1 is a char boundary
            let idx = search_from + rel;
            let candidate = self.buf[..=idx].trim();

            if candidate.len() >= self.min_chars {
                sentences.push(candidate.to_string());
                self.buf.drain(..=idx);
                search_from = 0;
            } else {
                search_from = idx + 1;
            }
        }

        sentences
    }

    /// Drain whatever is left after the token stream ends.
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = self.buf.trim().to_string();
        self.buf.clear();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// Spawn the cancellable response task for one final transcript.
///
/// The caller installs the returned handle in the session's task slot via
/// [`Session::replace_response_task`], which guarantees at most one task is in
/// flight per session.
pub fn spawn_response(
    session: Arc<Session>,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    min_sentence_chars: usize,
) -> ResponseTask {
    let (abort_handle, abort_registration) = AbortHandle::new_pair();

    // Set eagerly so a barge-in arriving right after spawn sees the task
    session.set_responding(true);

    let body = Abortable::new(
        run_response(session.clone(), generator, synthesizer, min_sentence_chars),
        abort_registration,
    );

    let cleanup_session = session;
    let handle = tokio::spawn(async move {
        match body.await {
            Ok(Ok(())) => {}
            Ok(Err(VoiceError::TransportClosed)) => {
                debug!(
                    session_id = %cleanup_session.id,
                    "response task stopped: client transport closed"
                );
            }
            Ok(Err(err)) => {
                // Collaborator failure mid-response: log and terminate the
                // turn; the session stays usable for the next utterance
                warn!(session_id = %cleanup_session.id, "response task ended early: {}", err);
            }
            Err(_aborted) => {
                debug!(session_id = %cleanup_session.id, "response task cancelled");
            }
        }

        // Guaranteed cleanup: runs on completion, cancellation, and error
        cleanup_session.set_responding(false);
    });

    ResponseTask::new(abort_handle, handle)
}

/// The response task body (steps 2–7).
async fn run_response(
    session: Arc<Session>,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    min_sentence_chars: usize,
) -> VoiceResult<()> {
    let history = session.history_snapshot();
    let mut tokens = generator
        .stream_chat_completion(&history)
        .await
        .map_err(VoiceError::collaborator)?;

    let mut sentences = SentenceBuffer::new(min_sentence_chars);
    let mut full_response = String::new();

    while let Some(token) = tokens.next().await {
        let token = token.map_err(VoiceError::collaborator)?;
        full_response.push_str(&token);

        for sentence in sentences.push(&token) {
            speak_sentence(&session, synthesizer.as_ref(), &sentence).await?;
        }
    }

    if let Some(rest) = sentences.take_remainder() {
        speak_sentence(&session, synthesizer.as_ref(), &rest).await?;
    }

    // User final was appended before this task started, so turn order holds
    session.append_turn(Role::Assistant, full_response.clone());

    // Widget dispatch must not block turn completion
    widget::dispatch_widget_triggers(session.clone(), full_response);

    session.send(ServerMessage::AiComplete)?;
    Ok(())
}

/// Send one sentence's text, then all of its audio, in order.
async fn speak_sentence(
    session: &Session,
    synthesizer: &dyn SpeechSynthesizer,
    sentence: &str,
) -> VoiceResult<()> {
    session.send(ServerMessage::AiTranscript {
        text: sentence.to_string(),
        is_final: false,
    })?;

    let mut audio = synthesizer
        .synthesize_stream(sentence)
        .await
        .map_err(VoiceError::collaborator)?;

    while let Some(chunk) = audio.next().await {
        let chunk = chunk.map_err(VoiceError::collaborator)?;
        session.send_audio(chunk)?;
    }

    Ok(())
}
