//! # Error Handling
//!
//! This module defines the error taxonomy for the voice session backend and how
//! each error is converted to an HTTP response when it surfaces at the web layer.
//!
//! ## Error Categories:
//!
//! ### Caller errors (surfaced immediately)
//! - **DuplicateSession**: a connect was attempted with an ID that is already live
//! - **UnknownSession**: an operation referenced a session ID that is not registered
//! - **InvalidConfiguration**: configuration values that can never work (e.g. a
//!   zero-byte audio frame size)
//!
//! ### Recovered locally (logged, session continues)
//! - **CollaboratorUnavailable**: an STT/generation/synthesis call failed mid-turn
//! - **MalformedWidgetPayload**: a widget directive carried JSON that does not parse
//!
//! ### Teardown
//! - **TransportClosed**: the outbound channel to the client is gone; the session
//!   is torn down through the registry
//!
//! ## Propagation policy:
//! Collaborator and widget failures must never crash a session: the client simply
//! receives no further audio/text for that turn and the session stays usable for
//! the next utterance. Everything else is returned to the caller.

use actix_web::{HttpResponse, ResponseError};  // Web framework error handling
use serde_json::json;                          // For creating JSON error responses
use std::fmt;                                  // For implementing Display trait

/// Custom error types for the voice session backend.
///
/// ## Rust Concepts:
/// - **enum**: A type that can be one of several variants
/// - **String payloads**: Most variants carry a human-readable detail message
/// - **#[derive(Debug)]**: Automatically implements debug printing
#[derive(Debug)]
pub enum VoiceError {
    /// A session with this ID is already registered
    DuplicateSession(String),

    /// No session with this ID is registered
    UnknownSession(String),

    /// Configuration values that cannot produce a working session
    InvalidConfiguration(String),

    /// A streaming collaborator (STT, generation, synthesis, profile lookup)
    /// failed or is absent
    CollaboratorUnavailable(String),

    /// A widget directive in a response carried unparseable JSON
    MalformedWidgetPayload(String),

    /// The outbound message channel to the client has been closed
    TransportClosed,

    /// The registry is at its configured concurrent session capacity
    SessionLimitReached(usize),
}

impl VoiceError {
    /// Wrap a collaborator failure, preserving the error chain in the message.
    ///
    /// ## Usage:
    /// Collaborator traits return `anyhow::Error`; the orchestration layer maps
    /// those into `CollaboratorUnavailable` at the call boundary so the failure
    /// semantics (log and degrade, never crash) stay in one place.
    pub fn collaborator(err: anyhow::Error) -> Self {
        VoiceError::CollaboratorUnavailable(format!("{:#}", err))
    }

    /// Machine-readable error code used in wire-level error frames.
    pub fn code(&self) -> &'static str {
        match self {
            VoiceError::DuplicateSession(_) => "duplicate_session",
            VoiceError::UnknownSession(_) => "unknown_session",
            VoiceError::InvalidConfiguration(_) => "invalid_configuration",
            VoiceError::CollaboratorUnavailable(_) => "collaborator_unavailable",
            VoiceError::MalformedWidgetPayload(_) => "malformed_widget_payload",
            VoiceError::TransportClosed => "transport_closed",
            VoiceError::SessionLimitReached(_) => "session_limit_reached",
        }
    }
}

/// Human-readable formatting for log lines and error frames.
impl fmt::Display for VoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceError::DuplicateSession(id) => write!(f, "Session '{}' is already registered", id),
            VoiceError::UnknownSession(id) => write!(f, "Unknown session '{}'", id),
            VoiceError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            VoiceError::CollaboratorUnavailable(msg) => write!(f, "Collaborator unavailable: {}", msg),
            VoiceError::MalformedWidgetPayload(msg) => write!(f, "Malformed widget payload: {}", msg),
            VoiceError::TransportClosed => write!(f, "Client transport closed"),
            VoiceError::SessionLimitReached(max) => {
                write!(f, "Maximum concurrent sessions ({}) reached", max)
            }
        }
    }
}

/// Conversion of voice errors into HTTP responses.
///
/// ## HTTP Status Code Mapping:
/// - DuplicateSession → 409 (Conflict)
/// - UnknownSession → 404 (Not Found)
/// - InvalidConfiguration / TransportClosed → 500 (Internal Server Error)
/// - CollaboratorUnavailable / SessionLimitReached → 503 (Service Unavailable)
/// - MalformedWidgetPayload → 400 (Bad Request)
///
/// ## JSON Response Format:
/// All errors return JSON with a consistent structure:
/// ```json
/// {
///   "error": {
///     "type": "duplicate_session",
///     "message": "Session 'abc' is already registered",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for VoiceError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let status = match self {
            VoiceError::DuplicateSession(_) => StatusCode::CONFLICT,
            VoiceError::UnknownSession(_) => StatusCode::NOT_FOUND,
            VoiceError::InvalidConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VoiceError::CollaboratorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            VoiceError::MalformedWidgetPayload(_) => StatusCode::BAD_REQUEST,
            VoiceError::TransportClosed => StatusCode::INTERNAL_SERVER_ERROR,
            VoiceError::SessionLimitReached(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": self.code(),
                "message": self.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Automatic conversion from configuration errors.
///
/// ## When this happens:
/// - config.toml has invalid syntax
/// - An APP_* environment variable override fails to parse
/// - Configuration values fail validation
impl From<config::ConfigError> for VoiceError {
    fn from(err: config::ConfigError) -> Self {
        VoiceError::InvalidConfiguration(err.to_string())
    }
}

/// Automatic conversion from JSON parsing errors.
///
/// ## Why MalformedWidgetPayload:
/// The only place the core parses free-form JSON is the widget directive
/// scanner, and those failures must degrade gracefully rather than abort
/// the response pipeline.
impl From<serde_json::Error> for VoiceError {
    fn from(err: serde_json::Error) -> Self {
        VoiceError::MalformedWidgetPayload(err.to_string())
    }
}

/// Type alias for Results that use the voice error type.
pub type VoiceResult<T> = Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(VoiceError::DuplicateSession("a".into()).code(), "duplicate_session");
        assert_eq!(VoiceError::TransportClosed.code(), "transport_closed");
        assert_eq!(
            VoiceError::CollaboratorUnavailable("tts down".into()).code(),
            "collaborator_unavailable"
        );
    }

    #[test]
    fn test_json_error_converts_to_malformed_widget_payload() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json}").unwrap_err();
        let err = VoiceError::from(parse_err);
        assert!(matches!(err, VoiceError::MalformedWidgetPayload(_)));
        assert_eq!(err.code(), "malformed_widget_payload");
    }

    #[test]
    fn test_display_includes_detail() {
        let err = VoiceError::SessionLimitReached(32);
        assert!(err.to_string().contains("32"));

        let err = VoiceError::DuplicateSession("session-1".into());
        assert!(err.to_string().contains("session-1"));
    }
}
