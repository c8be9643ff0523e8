//! # Session Module
//!
//! Everything that lives for the duration of one client connection: the session
//! state itself, the registry mapping session IDs to live sessions, the
//! transcript router that turns final transcripts into response turns, the
//! response orchestrator (the one cancellable task per session), and the widget
//! trigger extractor.
//!
//! ## Concurrency model:
//! Sessions run fully concurrently and independently; the registry map is the
//! only cross-session shared state. Within one session, at most one response
//! task is ever in flight, and all outbound writes are serialized through the
//! session's single outbound channel.

pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod transcript;
pub mod widget;

pub use registry::SessionRegistry;
pub use session::{ChatTurn, ResponseTask, Role, Session};
pub use transcript::TranscriptRouter;
