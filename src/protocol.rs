//! # Wire Protocol
//!
//! Message types exchanged with the client over one WebSocket connection per
//! session.
//!
//! ## Message Format:
//! - **Client → Server (binary)**: raw PCM audio, 16-bit signed little-endian,
//!   mono, at the configured sample rate
//! - **Server → Client (binary)**: synthesized PCM audio chunks, same format
//! - **Server → Client (text)**: JSON control messages tagged by `type`
//! - **Client → Server (text)**: JSON heartbeat replies
//!
//! ## Write serialization:
//! Every server-to-client frame (text or binary) flows through one per-session
//! [`Outbound`] channel that the WebSocket actor drains, so audio and control
//! frames are never interleaved mid-sentence by concurrent writers.

use serde::{Deserialize, Serialize};

/// Control messages sent from the server to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Speech recognition result, interim or final
    #[serde(rename = "transcript")]
    Transcript {
        /// Recognized text
        text: String,
        /// Whether the recognizer marked this result complete
        is_final: bool,
    },

    /// One sentence of the assistant's response, sent before its audio
    #[serde(rename = "ai_transcript")]
    AiTranscript {
        /// Sentence text
        text: String,
        /// Always false: sentences stream incrementally
        is_final: bool,
    },

    /// The in-flight response was cancelled by user speech (barge-in)
    #[serde(rename = "interrupt")]
    Interrupt,

    /// The response turn finished; no further audio follows for this turn
    #[serde(rename = "ai_complete")]
    AiComplete,

    /// A UI widget push extracted from the response text
    #[serde(rename = "widget")]
    Widget {
        /// Widget component name from the directive tag
        component: String,
        /// Parsed JSON payload of the directive
        data: serde_json::Value,
    },

    /// Error frame for caller errors that are surfaced to the client
    #[serde(rename = "error")]
    Error {
        /// Machine-readable error code
        code: String,
        /// Human-readable error message
        message: String,
    },

    /// Heartbeat probe; the client answers with a pong
    #[serde(rename = "ping")]
    Ping {
        /// Timestamp for latency measurement (milliseconds since epoch)
        timestamp: u64,
    },
}

/// Control messages received from the client as text frames.
///
/// Audio arrives as binary frames and never goes through this enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Heartbeat reply
    #[serde(rename = "pong")]
    Pong {
        /// Original timestamp from the ping
        timestamp: u64,
    },
}

/// One outbound item on a session's write channel.
///
/// The session owns the sending half exclusively for its lifetime; the
/// WebSocket actor owns the receiving half and is the only writer to the
/// underlying socket.
#[derive(Debug)]
pub enum Outbound {
    /// JSON control message (sent as a text frame)
    Message(ServerMessage),
    /// Synthesized PCM audio chunk (sent as a binary frame)
    Audio(Vec<u8>),
}
