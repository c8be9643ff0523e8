//! # Session Registry
//!
//! Maps session identifiers to live session state and handles the
//! connect/disconnect lifecycle. This map is the only mutable state shared
//! across sessions, so it must be safe under concurrent connect/disconnect
//! from many connections at once.
//!
//! ## Resource Management:
//! - Enforces the configured maximum number of concurrent sessions
//! - Disconnecting cancels any in-flight response task for that session

use crate::error::{VoiceError, VoiceResult};
use crate::protocol::Outbound;
use crate::session::Session;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Registry of all live sessions.
///
/// ## Thread Safety:
/// Uses an `RwLock` so many connections can look sessions up concurrently
/// while connects and disconnects take the write lock briefly.
pub struct SessionRegistry {
    /// Active sessions mapped by session ID
    sessions: RwLock<HashMap<String, Arc<Session>>>,

    /// Maximum number of concurrent sessions allowed
    max_concurrent_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_concurrent_sessions,
        }
    }

    /// Create and store session state for a new connection.
    ///
    /// ## Errors:
    /// - `DuplicateSession` if the ID is already registered
    /// - `SessionLimitReached` if the registry is at capacity
    pub fn connect(
        &self,
        id: &str,
        outbound: mpsc::UnboundedSender<Outbound>,
        system_prompt: String,
    ) -> VoiceResult<Arc<Session>> {
        let mut sessions = self.sessions.write().unwrap();

        if sessions.len() >= self.max_concurrent_sessions {
            return Err(VoiceError::SessionLimitReached(self.max_concurrent_sessions));
        }

        if sessions.contains_key(id) {
            return Err(VoiceError::DuplicateSession(id.to_string()));
        }

        let session = Arc::new(Session::new(id, outbound, system_prompt));
        sessions.insert(id.to_string(), session.clone());

        info!("Session {} connected ({} active)", id, sessions.len());
        Ok(session)
    }

    /// Remove a session and cancel any in-flight response task.
    ///
    /// A disconnect for an unknown ID is a logged no-op; the client may have
    /// raced its own teardown.
    pub fn disconnect(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().unwrap().remove(id);

        match removed {
            Some(session) => {
                // Cancellation awaits the old task, so it runs off the registry lock
                let cancelling = session.clone();
                tokio::spawn(async move {
                    if cancelling.cancel_response_task().await {
                        info!(
                            "Session {}: cancelled in-flight response on disconnect",
                            cancelling.id
                        );
                    }
                });

                info!("Session {} disconnected", id);
                Some(session)
            }
            None => {
                warn!("{}", VoiceError::UnknownSession(id.to_string()));
                None
            }
        }
    }

    /// Look up a live session by ID.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().unwrap().get(id).cloned()
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_registers_session() {
        let registry = SessionRegistry::new(4);
        let (tx, _rx) = mpsc::unbounded_channel();

        let session = registry.connect("a", tx, "prompt".into()).unwrap();
        assert_eq!(session.id, "a");
        assert_eq!(registry.active_count(), 1);
        assert!(registry.get("a").is_some());
    }

    #[test]
    fn test_duplicate_connect_is_rejected() {
        let registry = SessionRegistry::new(4);
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        registry.connect("a", tx_a, "prompt".into()).unwrap();

        let err = registry.connect("a", tx_b, "prompt".into()).unwrap_err();
        assert!(matches!(err, VoiceError::DuplicateSession(_)));
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let registry = SessionRegistry::new(2);
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let (tx_c, _rx_c) = mpsc::unbounded_channel();
        registry.connect("a", tx_a, "p".into()).unwrap();
        registry.connect("b", tx_b, "p".into()).unwrap();

        let err = registry.connect("c", tx_c, "p".into()).unwrap_err();
        assert!(matches!(err, VoiceError::SessionLimitReached(2)));
    }

    #[tokio::test]
    async fn test_disconnect_removes_session() {
        let registry = SessionRegistry::new(4);
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.connect("a", tx, "p".into()).unwrap();

        assert!(registry.disconnect("a").is_some());
        assert_eq!(registry.active_count(), 0);
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn test_disconnect_unknown_is_noop() {
        let registry = SessionRegistry::new(4);
        assert!(registry.disconnect("ghost").is_none());
        assert_eq!(registry.active_count(), 0);
    }
}
