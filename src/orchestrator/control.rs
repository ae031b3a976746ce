//! Shared control surface of a running session.
//!
//! The coordinator loop is the only writer of session state; it publishes a
//! clone after every iteration. Everything else (the HTTP API, the Ctrl-C
//! handler, tests) holds a cheap [`SessionHandle`] clone to read that
//! snapshot and flip the loop's control flags.

use crate::session::{SessionSnapshot, SessionState, SessionSummary};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::futures::Notified;
use tokio::sync::{Notify, RwLock};
use tracing::info;

#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: String,
    snapshot: Arc<RwLock<SessionState>>,
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    review_requested: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(state: SessionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            snapshot: Arc::new(RwLock::new(state)),
            paused: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            review_requested: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Suspend the loop. Workers keep running.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!(session_id = %self.session_id, "Session paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!(session_id = %self.session_id, "Session resumed");
        }
        self.wake.notify_one();
    }

    /// Ask the loop to stop every worker and exit.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!(session_id = %self.session_id, "Stop requested");
        }
        self.wake.notify_one();
    }

    /// Force a review round on the next iteration.
    pub fn trigger_review(&self) {
        self.review_requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Consume a pending forced-review request.
    pub fn take_review_request(&self) -> bool {
        self.review_requested.swap(false, Ordering::SeqCst)
    }

    /// Resolves when a control call wants the loop to wake up early.
    pub fn notified(&self) -> Notified<'_> {
        self.wake.notified()
    }

    /// Replace the published state. Called by the loop only.
    pub async fn publish(&self, state: SessionState) {
        *self.snapshot.write().await = state;
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.snapshot.read().await.clone(),
            paused: self.is_paused(),
            stopped: self.is_stopped(),
        }
    }

    pub async fn summary(&self) -> SessionSummary {
        self.snapshot.read().await.summary()
    }
}
