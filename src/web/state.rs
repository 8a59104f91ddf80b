//! Process-wide shared state: the session registry and per-session wiring
//! (VAD, recognizer, debounce fan-out) that both the WebRTC signaling path
//! and the HTTP data API operate against.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::Config;
use crate::debounce::{self, DebounceHandler, Debouncer};
use crate::recognizer::RecognizerClient;
use crate::store;
use crate::timeline::{Id, Session};
use crate::vad::Vad;

/// A live session plus the handle needed to fan out its update notifier to
/// any number of `/sessions/:id/data` WebSocket subscribers.
pub struct SessionEntry {
    pub session: Arc<Session>,
    /// Ticks once per coalesced update; cloned by every data-channel
    /// subscriber via `watch::Receiver::subscribe`-style `.clone()`.
    pub updates: watch::Receiver<()>,
}

/// Shared daemon state: configuration plus every session created so far.
/// Cheap to clone (wrapped in `Arc` at the call site); the registry itself
/// is the only mutable piece.
pub struct AppState {
    pub config: Config,
    sessions: Mutex<HashMap<Id, Arc<SessionEntry>>>,
    cancel: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(config: Config, cancel: watch::Receiver<bool>) -> Arc<AppState> {
        Arc::new(AppState {
            config,
            sessions: Mutex::new(HashMap::new()),
            cancel,
        })
    }

    /// Creates a new session, wires up its handlers (VAD, recognizer,
    /// debounce), spawns the background task that fans out debounce ticks
    /// to a `watch` channel, and registers it.
    pub fn create_session(self: &Arc<Self>) -> Arc<SessionEntry> {
        let session = Session::new();

        let vad = Arc::new(Vad::new(self.config.vad.into()));
        session.listen(vad);

        let recognizer = Arc::new(RecognizerClient::new(self.config.recognizer.clone().into()));
        session.listen(recognizer);

        let (debouncer, rx) = Debouncer::new();
        session.listen(Arc::new(DebounceHandler::new(debouncer)));

        let (updates_tx, updates_rx) = watch::channel(());
        let cancel = self.cancel.clone();
        let sessions_dir = self.config.server.sessions_dir.clone();
        let snapshot_target = session.clone();
        tokio::spawn(async move {
            debounce::run_drain_loop(rx, cancel, || {
                let updates_tx = updates_tx.clone();
                let sessions_dir = sessions_dir.clone();
                let session = snapshot_target.clone();
                async move {
                    snapshot_to_disk(&session, &sessions_dir).await;
                    let _ = updates_tx.send(());
                }
            })
            .await;
        });

        let entry = Arc::new(SessionEntry {
            session: session.clone(),
            updates: updates_rx,
        });
        self.sessions.lock().insert(session.id.clone(), entry.clone());
        info!("created session {}", session.id);
        entry
    }

    pub fn get(&self, id: &Id) -> Option<Arc<SessionEntry>> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &Id) -> Option<Arc<SessionEntry>> {
        self.sessions.lock().remove(id)
    }

    pub fn sessions(&self) -> Vec<Arc<SessionEntry>> {
        self.sessions.lock().values().cloned().collect()
    }

    /// Snapshots every live session once. Called on the orderly-shutdown
    /// path once the cancellation token has been observed by every task.
    pub async fn snapshot_all(&self) {
        let sessions_dir = self.config.server.sessions_dir.clone();
        for entry in self.sessions() {
            snapshot_to_disk(&entry.session, &sessions_dir).await;
        }
    }
}

/// Runs `store::save` on a blocking thread and logs, rather than panics,
/// on failure — a snapshot failure must not take down the debounce loop.
async fn snapshot_to_disk(session: &Arc<Session>, sessions_dir: &std::path::Path) {
    let session = session.clone();
    let sessions_dir = sessions_dir.to_path_buf();
    let result = tokio::task::spawn_blocking(move || store::save(&session, &sessions_dir)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("snapshot failed: {}", e),
        Err(e) => warn!("snapshot task panicked: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_session_registers_and_is_retrievable() {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let state = AppState::new(Config::default(), cancel_rx);
        let entry = state.create_session();
        let id = entry.session.id.clone();
        assert!(state.get(&id).is_some());
        assert_eq!(state.sessions().len(), 1);
    }

    #[tokio::test]
    async fn removed_session_is_no_longer_retrievable() {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let state = AppState::new(Config::default(), cancel_rx);
        let entry = state.create_session();
        let id = entry.session.id.clone();
        state.remove(&id);
        assert!(state.get(&id).is_none());
    }
}
