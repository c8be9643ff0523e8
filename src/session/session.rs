//! # Session State
//!
//! One [`Session`] per live connection. The session exclusively owns the
//! outbound channel to its client, the append-only conversation history, and
//! the slot for the single in-flight response task.
//!
//! ## Invariants:
//! - At most one response task is in flight per session; starting a new one
//!   aborts and awaits termination of the previous one first
//! - History ordering matches real-world turn order: user finals are appended
//!   strictly before the matching assistant turn
//! - The history is append-only except for system-seed injection at start
//!
//! ## Thread Safety:
//! Sessions are shared as `Arc<Session>` between the WebSocket actor, the
//! transcript router task, and response tasks. History and profile use plain
//! mutexes (held only for short synchronous sections); the response task slot
//! uses a tokio mutex because superseding awaits the old task's termination
//! while holding it.

use crate::collaborators::UserProfile;
use crate::error::{VoiceError, VoiceResult};
use crate::protocol::{Outbound, ServerMessage};

use chrono::{DateTime, Utc};
use futures_util::future::AbortHandle;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Speaker role of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One (role, content) turn of the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Handle to the single cancellable response task of a session.
///
/// ## Cancellation:
/// `abort()` requests cooperative cancellation; the task observes it at its
/// next suspension point. `join()` awaits the task's guaranteed cleanup, so a
/// caller that aborts and then joins knows no further audio will be emitted.
#[derive(Debug)]
pub struct ResponseTask {
    abort: AbortHandle,
    handle: JoinHandle<()>,
}

impl ResponseTask {
    pub fn new(abort: AbortHandle, handle: JoinHandle<()>) -> Self {
        Self { abort, handle }
    }

    /// Request cooperative cancellation.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Await task termination (normal, errored, or aborted).
    pub async fn join(self) {
        // The task never panics by design; a JoinError here is only possible
        // on runtime shutdown, which we ignore.
        let _ = self.handle.await;
    }
}

/// State for one live voice connection.
#[derive(Debug)]
pub struct Session {
    /// Opaque session identifier (externally supplied)
    pub id: String,

    /// Exclusive outbound channel to this client; the WebSocket actor drains it
    outbound: mpsc::UnboundedSender<Outbound>,

    /// Ordered conversation history; append-only after the system seed
    history: Mutex<Vec<ChatTurn>>,

    /// Whether a response task is currently emitting output
    responding: AtomicBool,

    /// Slot for the single in-flight response task
    task: tokio::sync::Mutex<Option<ResponseTask>>,

    /// Bumped every time the task slot changes; lets a barge-in that was
    /// detected against one task refuse to abort a later one
    generation: AtomicU64,

    /// Personalization data fetched once at session start
    profile: Mutex<Option<UserProfile>>,

    /// When the session connected
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session seeded with the system prompt as its first turn.
    pub fn new(
        id: impl Into<String>,
        outbound: mpsc::UnboundedSender<Outbound>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            outbound,
            history: Mutex::new(vec![ChatTurn::new(Role::System, system_prompt)]),
            responding: AtomicBool::new(false),
            task: tokio::sync::Mutex::new(None),
            generation: AtomicU64::new(0),
            profile: Mutex::new(None),
            created_at: Utc::now(),
        }
    }

    /// Send a JSON control message to the client.
    pub fn send(&self, message: ServerMessage) -> VoiceResult<()> {
        self.outbound
            .send(Outbound::Message(message))
            .map_err(|_| VoiceError::TransportClosed)
    }

    /// Send a synthesized PCM chunk to the client.
    pub fn send_audio(&self, chunk: Vec<u8>) -> VoiceResult<()> {
        self.outbound
            .send(Outbound::Audio(chunk))
            .map_err(|_| VoiceError::TransportClosed)
    }

    /// Append one turn to the conversation history.
    pub fn append_turn(&self, role: Role, content: String) {
        self.history.lock().unwrap().push(ChatTurn::new(role, content));
    }

    /// Copy of the full history, for handing to the text generator.
    pub fn history_snapshot(&self) -> Vec<ChatTurn> {
        self.history.lock().unwrap().clone()
    }

    /// Whether a response task is currently in flight.
    pub fn is_responding(&self) -> bool {
        self.responding.load(Ordering::SeqCst)
    }

    pub(crate) fn set_responding(&self, value: bool) {
        self.responding.store(value, Ordering::SeqCst);
    }

    /// Current task-slot generation. Capture this when speech is detected and
    /// pass it to [`Session::barge_in`]; the barge-in is dropped if the slot
    /// changed in between.
    pub fn task_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Inject personalization context fetched at session start.
    ///
    /// Augments the system seed turn in place; the history stays append-only
    /// for every other turn. The profile is immutable afterwards.
    pub fn seed_profile(&self, profile: UserProfile) {
        {
            let mut history = self.history.lock().unwrap();
            if let Some(seed) = history.first_mut() {
                if seed.role == Role::System {
                    seed.content
                        .push_str(&format!("\n\nYou are speaking with {}.", profile.display_name));
                    if !profile.interests.is_empty() {
                        seed.content.push_str(&format!(
                            " Their interests include: {}.",
                            profile.interests.join(", ")
                        ));
                    }
                }
            }
        }
        *self.profile.lock().unwrap() = Some(profile);
    }

    /// The profile fetched at session start, if any.
    pub fn profile(&self) -> Option<UserProfile> {
        self.profile.lock().unwrap().clone()
    }

    /// Supersede the in-flight response task, if any, and install a new one.
    ///
    /// ## Serialization point:
    /// The old task is aborted and *awaited* before `build` runs, so the new
    /// task's side effects (sending audio) can never interleave with the old
    /// task's on the same outbound channel. Even when two final transcripts
    /// race, the task-slot lock orders them.
    pub async fn replace_response_task<F>(&self, build: F)
    where
        F: FnOnce() -> ResponseTask,
    {
        let mut slot = self.task.lock().await;
        if let Some(old) = slot.take() {
            debug!(session_id = %self.id, "superseding in-flight response task");
            old.abort();
            old.join().await;
            self.set_responding(false);
        }
        *slot = Some(build());
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Abort and await the in-flight response task, if any.
    ///
    /// ## Returns:
    /// Whether a task was actually cancelled.
    pub async fn cancel_response_task(&self) -> bool {
        let mut slot = self.task.lock().await;
        if let Some(task) = slot.take() {
            task.abort();
            task.join().await;
            self.set_responding(false);
            self.generation.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Barge-in: user speech started while a response was in flight.
    ///
    /// Aborts the active task, awaits its termination, and sends exactly one
    /// `interrupt` message. Idempotent: a no-op when no task is active or the
    /// task already finished on its own.
    ///
    /// `observed_generation` is the [`Session::task_generation`] value read
    /// when the speech was detected. If the task slot changed in between (a
    /// racing final installed a superseding task), the barge-in is stale and
    /// must not abort the new task.
    pub async fn barge_in(&self, observed_generation: u64) -> VoiceResult<()> {
        let mut slot = self.task.lock().await;
        if self.generation.load(Ordering::SeqCst) != observed_generation {
            debug!(session_id = %self.id, "dropping stale barge-in");
            return Ok(());
        }
        match slot.take() {
            Some(task) if self.is_responding() => {
                debug!(session_id = %self.id, "barge-in: cancelling in-flight response");
                task.abort();
                task.join().await;
                self.set_responding(false);
                self.generation.fetch_add(1, Ordering::SeqCst);
                self.send(ServerMessage::Interrupt)?;
            }
            Some(task) => {
                // Task finished naturally between the trigger and the lock;
                // nothing to interrupt.
                *slot = Some(task);
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> (Session, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new("s-1", tx, "You are a test assistant."), rx)
    }

    #[test]
    fn test_history_starts_with_system_seed() {
        let (session, _rx) = test_session();
        let history = session.history_snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::System);
    }

    #[test]
    fn test_history_preserves_turn_order() {
        let (session, _rx) = test_session();
        session.append_turn(Role::User, "hello".to_string());
        session.append_turn(Role::Assistant, "hi there".to_string());

        let history = session.history_snapshot();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].role, Role::User);
        assert_eq!(history[2].role, Role::Assistant);
    }

    #[test]
    fn test_seed_profile_augments_system_turn() {
        let (session, _rx) = test_session();
        session.seed_profile(UserProfile {
            display_name: "Ada".to_string(),
            interests: vec!["chess".to_string(), "history".to_string()],
        });

        let history = session.history_snapshot();
        assert_eq!(history.len(), 1, "seeding must not append turns");
        assert!(history[0].content.contains("Ada"));
        assert!(history[0].content.contains("chess, history"));
        assert!(session.profile().is_some());
    }

    #[test]
    fn test_send_after_transport_closed() {
        let (session, rx) = test_session();
        drop(rx);
        assert!(matches!(
            session.send(ServerMessage::AiComplete),
            Err(VoiceError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn test_barge_in_without_task_is_noop() {
        let (session, mut rx) = test_session();
        session.barge_in(session.task_generation()).await.unwrap();

        // No interrupt (or anything else) was sent
        assert!(rx.try_recv().is_err());
        assert!(!session.is_responding());
    }

    #[tokio::test]
    async fn test_cancel_without_task_reports_false() {
        let (session, _rx) = test_session();
        assert!(!session.cancel_response_task().await);
    }

    /// A task that runs until aborted, standing in for a response in flight.
    fn pending_task() -> ResponseTask {
        let (abort, registration) = AbortHandle::new_pair();
        let handle = tokio::spawn(async move {
            let _ = futures_util::future::Abortable::new(
                futures_util::future::pending::<()>(),
                registration,
            )
            .await;
        });
        ResponseTask::new(abort, handle)
    }

    /// A barge-in detected against one task must not abort a task installed
    /// after the detection: a racing final's superseding response keeps
    /// playing and no interrupt is emitted.
    #[tokio::test]
    async fn test_stale_barge_in_spares_superseding_task() {
        let (session, mut rx) = test_session();

        session.replace_response_task(pending_task).await;
        session.set_responding(true);
        let observed = session.task_generation();

        // A final transcript supersedes before the barge-in runs
        session.replace_response_task(pending_task).await;
        session.set_responding(true);

        session.barge_in(observed).await.unwrap();

        assert!(session.is_responding(), "superseding task was aborted");
        assert!(rx.try_recv().is_err(), "stale barge-in sent a message");

        // The superseding task is still in the slot
        assert!(session.cancel_response_task().await);
    }

    /// A barge-in with the current generation still interrupts normally.
    #[tokio::test]
    async fn test_current_barge_in_interrupts() {
        let (session, mut rx) = test_session();

        session.replace_response_task(pending_task).await;
        session.set_responding(true);

        session.barge_in(session.task_generation()).await.unwrap();

        assert!(!session.is_responding());
        assert!(matches!(
            rx.try_recv().unwrap(),
            Outbound::Message(ServerMessage::Interrupt)
        ));
    }
}
