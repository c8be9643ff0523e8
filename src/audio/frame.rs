//! # Audio Frame Buffer
//!
//! Accumulates raw audio bytes from the network and slices them into
//! fixed-size frames for the VAD and the speech recognizer. Network messages
//! rarely align with frame boundaries, so leftover bytes persist across calls.
//!
//! ## Guarantees:
//! - Every produced frame is exactly `frame_size` bytes
//! - No byte is duplicated or dropped; frames come out in arrival order
//! - After a drain cycle the buffered remainder is always shorter than one frame

use crate::error::{VoiceError, VoiceResult};

/// Byte accumulator that drains fixed-size audio frames.
///
/// ## Ownership:
/// Each session owns exactly one frame buffer; it is only touched from that
/// session's connection handler, so no locking is needed.
pub struct FrameBuffer {
    /// Bytes received but not yet sliced into a full frame
    buffer: Vec<u8>,

    /// Fixed frame size in bytes (sample_rate * frame_duration * bytes_per_sample)
    frame_size: usize,
}

impl FrameBuffer {
    /// Create a frame buffer for the given frame size.
    ///
    /// ## Errors:
    /// Fails fast with `InvalidConfiguration` if `frame_size` is zero: a
    /// zero-byte frame would make the drain loop spin forever.
    pub fn new(frame_size: usize) -> VoiceResult<Self> {
        if frame_size == 0 {
            return Err(VoiceError::InvalidConfiguration(
                "audio frame size must be greater than 0 bytes".to_string(),
            ));
        }

        Ok(Self {
            buffer: Vec::with_capacity(frame_size * 2),
            frame_size,
        })
    }

    /// Append incoming bytes and drain every complete frame.
    ///
    /// ## Returns:
    /// All frames completed by this call, in order. The caller forwards each
    /// frame to the VAD first and the recognizer second.
    pub fn ingest(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_size {
            let frame: Vec<u8> = self.buffer.drain(..self.frame_size).collect();
            frames.push(frame);
        }

        frames
    }

    /// Number of buffered bytes not yet forming a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// The fixed frame size in bytes.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}
