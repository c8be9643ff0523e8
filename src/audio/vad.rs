//! # Voice Activity Detection
//!
//! Per-frame speech/silence classification with hysteresis. The detector's
//! speech-start events are what trigger barge-in when the assistant is
//! mid-response; end-of-utterance is the recognizer's job (its `is_final`
//! signal), not the VAD's.
//!
//! ## State machine:
//! - `Silent -> Speaking`: immediately on the first speech frame
//! - `Speaking -> Silent`: only after a configurable number of *consecutive*
//!   silence frames (hysteresis), so short pauses inside an utterance do not
//!   flap the state
//!
//! ## Classification:
//! A dedicated classifier can be installed behind the [`SpeechClassifier`]
//! trait; without one, a deterministic root-mean-square energy threshold is
//! used as the fallback.

use crate::config::VadConfig;
use byteorder::{ByteOrder, LittleEndian};

/// Per-frame speech classifier.
///
/// Implementations must be deterministic and side-effect-free: the same frame
/// always yields the same answer, and classification never mutates shared state.
pub trait SpeechClassifier: Send {
    /// Classify one frame of 16-bit PCM samples as speech (true) or silence.
    fn classify(&self, samples: &[i16]) -> bool;
}

/// Energy-threshold fallback classifier.
///
/// ## Method:
/// Root-mean-square amplitude over the frame compared against a fixed
/// threshold. Crude but deterministic, and good enough to detect barge-in
/// against a quiet background.
pub struct EnergyClassifier {
    threshold: f32,
}

impl EnergyClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Root-mean-square amplitude of the frame.
    fn rms(samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_squares / samples.len() as f64).sqrt() as f32
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn classify(&self, samples: &[i16]) -> bool {
        Self::rms(samples) > self.threshold
    }
}

/// Detector state: either inside an utterance or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// No speech in progress (initial state)
    Silent,
    /// An utterance is in progress
    Speaking,
}

/// Externally visible state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// `Silent -> Speaking`; triggers barge-in while a response is in flight
    SpeechStart,
    /// `Speaking -> Silent` after the hysteresis threshold was reached
    SpeechEnd,
}

/// Voice activity detector with silence hysteresis.
///
/// ## Ownership:
/// One detector per session, driven frame-by-frame from the session's
/// connection handler; all state is private to that session.
pub struct VoiceActivityDetector {
    classifier: Box<dyn SpeechClassifier>,
    state: VadState,
    /// Consecutive silence frames observed while Speaking
    silence_frames: u32,
    /// Consecutive silence frames required for Speaking -> Silent
    hangover_frames: u32,
}

impl VoiceActivityDetector {
    /// Create a detector with the energy fallback classifier.
    pub fn new(config: &VadConfig) -> Self {
        Self::with_classifier(
            Box::new(EnergyClassifier::new(config.energy_threshold)),
            config.silence_hangover_frames,
        )
    }

    /// Create a detector with a dedicated classifier (e.g. a model-backed one).
    pub fn with_classifier(classifier: Box<dyn SpeechClassifier>, hangover_frames: u32) -> Self {
        Self {
            classifier,
            state: VadState::Silent,
            silence_frames: 0,
            hangover_frames,
        }
    }

    /// Classify one frame of raw little-endian PCM bytes and advance the
    /// state machine.
    ///
    /// ## Returns:
    /// The transition this frame caused, if any.
    pub fn process(&mut self, frame: &[u8]) -> Option<VadEvent> {
        let mut samples = vec![0i16; frame.len() / 2];
        LittleEndian::read_i16_into(&frame[..samples.len() * 2], &mut samples);

        let is_speech = self.classifier.classify(&samples);

        match (self.state, is_speech) {
            (VadState::Silent, true) => {
                self.state = VadState::Speaking;
                self.silence_frames = 0;
                Some(VadEvent::SpeechStart)
            }
            (VadState::Silent, false) => None,
            (VadState::Speaking, true) => {
                self.silence_frames = 0;
                None
            }
            (VadState::Speaking, false) => {
                self.silence_frames += 1;
                if self.silence_frames >= self.hangover_frames {
                    self.state = VadState::Silent;
                    self.silence_frames = 0;
                    Some(VadEvent::SpeechEnd)
                } else {
                    None
                }
            }
        }
    }

    /// Current detector state.
    pub fn state(&self) -> VadState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A loud square-wave frame: unambiguous speech for the energy classifier.
    fn speech_frame(len_samples: usize) -> Vec<u8> {
        let mut frame = vec![0u8; len_samples * 2];
        for i in 0..len_samples {
            let sample: i16 = if i % 2 == 0 { 8000 } else { -8000 };
            LittleEndian::write_i16(&mut frame[i * 2..i * 2 + 2], sample);
        }
        frame
    }

    fn silence_frame(len_samples: usize) -> Vec<u8> {
        vec![0u8; len_samples * 2]
    }

    fn detector(hangover: u32) -> VoiceActivityDetector {
        VoiceActivityDetector::new(&VadConfig {
            energy_threshold: 500.0,
            silence_hangover_frames: hangover,
        })
    }

    #[test]
    fn test_energy_classifier_is_deterministic() {
        let classifier = EnergyClassifier::new(500.0);
        let loud: Vec<i16> = vec![8000; 480];
        let quiet: Vec<i16> = vec![10; 480];

        for _ in 0..3 {
            assert!(classifier.classify(&loud));
            assert!(!classifier.classify(&quiet));
        }
    }

    #[test]
    fn test_speech_start_is_immediate() {
        let mut vad = detector(5);
        assert_eq!(vad.state(), VadState::Silent);

        assert_eq!(vad.process(&speech_frame(480)), Some(VadEvent::SpeechStart));
        assert_eq!(vad.state(), VadState::Speaking);
    }

    /// Speaking -> Silent happens exactly when N consecutive silence frames
    /// reach the hysteresis threshold, and not before.
    #[test]
    fn test_hysteresis_exact_threshold() {
        let hangover = 5;
        let mut vad = detector(hangover);
        vad.process(&speech_frame(480));

        for i in 1..hangover {
            assert_eq!(vad.process(&silence_frame(480)), None, "frame {}", i);
            assert_eq!(vad.state(), VadState::Speaking);
        }

        assert_eq!(vad.process(&silence_frame(480)), Some(VadEvent::SpeechEnd));
        assert_eq!(vad.state(), VadState::Silent);
    }

    /// A speech frame inside the hangover window resets the silence counter.
    #[test]
    fn test_speech_resets_silence_counter() {
        let mut vad = detector(3);
        vad.process(&speech_frame(480));

        vad.process(&silence_frame(480));
        vad.process(&silence_frame(480));
        // Speech again before the threshold: still speaking, counter reset
        assert_eq!(vad.process(&speech_frame(480)), None);

        vad.process(&silence_frame(480));
        vad.process(&silence_frame(480));
        assert_eq!(vad.state(), VadState::Speaking);
        assert_eq!(vad.process(&silence_frame(480)), Some(VadEvent::SpeechEnd));
    }

    #[test]
    fn test_silence_while_silent_is_no_event() {
        let mut vad = detector(3);
        for _ in 0..10 {
            assert_eq!(vad.process(&silence_frame(480)), None);
        }
        assert_eq!(vad.state(), VadState::Silent);
    }
}
