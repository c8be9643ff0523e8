//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor: the runtime
//! configuration, the session registry, and the collaborator set.
//!
//! ## Thread Safety Pattern:
//! All handlers receive this state through `web::Data<AppState>`, which clones
//! the `Arc`s, never the data. Config lives behind `Arc<RwLock<_>>` so it can
//! be read concurrently; the registry carries its own interior locking.

use crate::collaborators::Collaborators;
use crate::config::AppConfig;
use crate::session::SessionRegistry;

use std::sync::{Arc, RwLock};
use std::time::Instant;

/// State shared across all connections.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (readable by every handler)
    pub config: Arc<RwLock<AppConfig>>,

    /// Registry of live voice sessions
    pub registry: Arc<SessionRegistry>,

    /// Pluggable STT / generation / TTS / profile backends
    pub collaborators: Collaborators,

    /// When the server started, for uptime reporting
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, collaborators: Collaborators) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            config.performance.max_concurrent_sessions,
        ));
        Self {
            config: Arc::new(RwLock::new(config)),
            registry,
            collaborators,
            start_time: Instant::now(),
        }
    }

    /// Copy of the current configuration.
    ///
    /// Cloning releases the lock immediately; `AppConfig` is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
