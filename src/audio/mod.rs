//! # Audio Processing Module
//!
//! Handles the inbound half of the duplex voice loop: raw PCM bytes from the
//! WebSocket are sliced into fixed-size frames and classified for speech
//! activity before being forwarded to the speech recognizer.
//!
//! ## Key Components:
//! - **Frame Buffer**: accumulates raw bytes, drains exact fixed-size frames
//! - **Voice Activity Detector**: speech/silence classification with hysteresis;
//!   its speech-start events drive barge-in
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: configurable, 24 kHz by default
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod frame;
pub mod vad;

pub use frame::FrameBuffer;
pub use vad::{VadEvent, VadState, VoiceActivityDetector};
