//! # WebSocket Voice Session Handler
//!
//! Handles one full-duplex voice session per WebSocket connection on
//! `/ws/voice`. Clients stream raw microphone PCM as binary frames; the server
//! streams back transcripts, assistant text, synthesized audio, and widget
//! pushes.
//!
//! ## Connection lifecycle:
//! 1. **Upgrade**: client connects with an optional `session_id` query param
//! 2. **Registration**: the session is registered; duplicates are rejected
//!    with an error frame before the actor stops
//! 3. **Inbound audio**: binary frames are sliced into fixed-size frames, run
//!    through VAD for barge-in detection, and forwarded to the recognizer in
//!    arrival order
//! 4. **Outbound**: the actor drains the session's single outbound channel;
//!    it is the only writer to the socket
//! 5. **Teardown**: disconnect cancels any in-flight response and closes the
//!    recognition stream
//!
//! ## Message Format:
//! - **Client → Server**: binary PCM audio (16-bit LE, mono) plus JSON `pong`
//!   heartbeat replies
//! - **Server → Client**: JSON control messages and binary synthesized PCM

use crate::audio::{FrameBuffer, VadEvent, VoiceActivityDetector};
use crate::protocol::{ClientMessage, Outbound, ServerMessage};
use crate::session::{Session, TranscriptRouter};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the server pings the client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long without any client life sign before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor for one voice session.
///
/// ## Actor Model:
/// Each connection is an independent actor. Collaborator work (recognition,
/// generation, synthesis) runs on spawned tasks; everything those tasks want
/// to send to the client flows back through the session's outbound channel,
/// which this actor drains as an attached stream.
pub struct VoiceWebSocket {
    /// Session ID for this connection (client-supplied or generated)
    session_id: String,

    /// Shared application state
    state: web::Data<AppState>,

    /// Registered session state; set once registration succeeds
    session: Option<Arc<Session>>,

    /// Slices arbitrary binary frames into fixed-size audio frames
    frames: FrameBuffer,

    /// Barge-in detector, fed every audio frame
    vad: VoiceActivityDetector,

    /// Ordered hand-off of audio frames to the recognizer forwarding task
    audio_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,

    /// Last time the client showed a sign of life
    last_heartbeat: Instant,
}

impl VoiceWebSocket {
    pub fn new(
        session_id: String,
        state: web::Data<AppState>,
        frames: FrameBuffer,
        vad: VoiceActivityDetector,
    ) -> Self {
        Self {
            session_id,
            state,
            session: None,
            frames,
            vad,
            audio_tx: None,
            last_heartbeat: Instant::now(),
        }
    }

    /// Send an error frame to the client.
    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        let error_msg = ServerMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
        };

        if let Ok(json) = serde_json::to_string(&error_msg) {
            ctx.text(json);
        }

        warn!("Session {} error {}: {}", self.session_id, code, message);
    }

    /// Slice, classify, and forward one binary frame of microphone audio.
    fn handle_audio_data(&mut self, data: &[u8]) {
        let Some(session) = self.session.clone() else {
            return;
        };

        for frame in self.frames.ingest(data) {
            // Barge-in: user speech started while the assistant is talking.
            // The generation captured here keeps the spawned barge-in from
            // aborting a task installed after this detection.
            if let Some(VadEvent::SpeechStart) = self.vad.process(&frame) {
                let generation = session.task_generation();
                if session.is_responding() {
                    let session = session.clone();
                    tokio::spawn(async move {
                        if let Err(err) = session.barge_in(generation).await {
                            debug!("Session {}: barge-in failed: {}", session.id, err);
                        }
                    });
                }
            }

            // Frames always reach the recognizer, speech or silence; the
            // forwarding task preserves arrival order
            if let Some(tx) = &self.audio_tx {
                let _ = tx.send(frame);
            }
        }
    }

    /// Wire up the collaborator tasks once the session is registered.
    fn start_session_tasks(&mut self, session: Arc<Session>) {
        let config = self.state.get_config();
        let collaborators = self.state.collaborators.clone();
        let session_id = self.session_id.clone();

        // One-shot personalization lookup; failure only costs personalization
        {
            let profiles = collaborators.profiles.clone();
            let session = session.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                match profiles.lookup(&session_id).await {
                    Ok(Some(profile)) => {
                        debug!("Session {}: profile found for {}", session_id, profile.display_name);
                        session.seed_profile(profile);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!("Session {}: profile lookup failed: {}", session_id, err);
                    }
                }
            });
        }

        // Recognition stream plus the transcript router that consumes it
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        {
            let recognizer = collaborators.recognizer.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                if let Err(err) = recognizer.start_streaming(&session_id, transcript_tx).await {
                    error!("Session {}: failed to start recognition: {}", session_id, err);
                }
            });
        }
        {
            let router = TranscriptRouter::new(
                session,
                collaborators.generator.clone(),
                collaborators.synthesizer.clone(),
                config.assistant.min_sentence_chars,
            );
            tokio::spawn(router.run(transcript_rx));
        }

        // Ordered frame forwarding into the recognizer
        let (audio_tx, mut audio_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        {
            let recognizer = collaborators.recognizer.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                while let Some(frame) = audio_rx.recv().await {
                    if let Err(err) = recognizer.send_frame(&session_id, &frame).await {
                        warn!("Session {}: recognizer rejected frame: {}", session_id, err);
                    }
                }
            });
        }
        self.audio_tx = Some(audio_tx);
    }
}

impl Actor for VoiceWebSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Register the session and wire up the duplex pipeline.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Session {}: WebSocket connection started", self.session_id);

        // Heartbeat timer
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("Session {}: heartbeat timeout, closing", act.session_id);
                ctx.stop();
                return;
            }

            let ping_msg = ServerMessage::Ping {
                timestamp: std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
            };
            if let Ok(json) = serde_json::to_string(&ping_msg) {
                ctx.text(json);
            }
        });

        let config = self.state.get_config();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let session = match self.state.registry.connect(
            &self.session_id,
            outbound_tx,
            config.assistant.system_prompt.clone(),
        ) {
            Ok(session) => session,
            Err(err) => {
                self.send_error(ctx, err.code(), &err.to_string());
                ctx.stop();
                return;
            }
        };

        // The actor is the only socket writer: it drains the session's
        // outbound channel as an attached stream
        ctx.add_stream(UnboundedReceiverStream::new(outbound_rx));

        self.session = Some(session.clone());
        self.start_session_tasks(session);
    }

    /// Tear the session down when the connection closes.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("Session {}: WebSocket connection stopped", self.session_id);

        if self.session.take().is_some() {
            self.state.registry.disconnect(&self.session_id);

            let recognizer = self.state.collaborators.recognizer.clone();
            let session_id = self.session_id.clone();
            tokio::spawn(async move {
                if let Err(err) = recognizer.stop_streaming(&session_id).await {
                    warn!("Session {}: failed to close recognition stream: {}", session_id, err);
                }
            });
        }
    }
}

/// Drain the session's outbound channel onto the socket.
impl StreamHandler<Outbound> for VoiceWebSocket {
    fn handle(&mut self, item: Outbound, ctx: &mut Self::Context) {
        match item {
            Outbound::Message(message) => {
                if let Ok(json) = serde_json::to_string(&message) {
                    ctx.text(json);
                }
            }
            Outbound::Audio(chunk) => {
                ctx.binary(chunk);
            }
        }
    }
}

/// Handle incoming WebSocket frames from the client.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VoiceWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.handle_audio_data(&data);
            }
            Ok(ws::Message::Text(text)) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Pong { timestamp: _ }) => {
                        self.last_heartbeat = Instant::now();
                    }
                    Err(err) => {
                        self.send_error(ctx, "invalid_json", &format!("Invalid JSON: {}", err));
                    }
                }
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Session {}: closed by client: {:?}", self.session_id, reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Session {}: unexpected continuation frame", self.session_id);
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("Session {}: protocol error: {}", self.session_id, err);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler.
///
/// Upgrades the HTTP request and hands the connection to a [`VoiceWebSocket`]
/// actor. The session ID comes from the `session_id` query parameter, or a
/// fresh UUID when the client sends none.
pub async fn voice_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .unwrap_or_else(|_| web::Query(HashMap::new()));

    let session_id = query
        .get("session_id")
        .cloned()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(
        "Session {}: new WebSocket connection from {:?}",
        session_id,
        req.connection_info().peer_addr()
    );

    let config = state.get_config();
    let frames = FrameBuffer::new(config.audio.frame_size_bytes())?;
    let vad = VoiceActivityDetector::new(&config.vad);

    ws::start(VoiceWebSocket::new(session_id, state, frames, vad), &req, stream)
}
