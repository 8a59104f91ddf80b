//! Coalescing change-notifier: touched on every non-transient event,
//! drained by a background task that snapshots the session and pushes an
//! update to the UI data channel.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::bus::AUDIO;
use crate::timeline::{Event, Handler};

/// A single-slot notifier. `touch` never blocks: if a notification is
/// already pending, a second `touch` before it's drained is a no-op.
#[derive(Clone)]
pub struct Debouncer {
    tx: mpsc::Sender<()>,
}

impl Debouncer {
    pub fn new() -> (Debouncer, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Debouncer { tx }, rx)
    }

    /// Requests a future drain. Drops the request silently if one is
    /// already queued.
    pub fn touch(&self) {
        let _ = self.tx.try_send(());
    }
}

/// A [`Handler`] that touches a [`Debouncer`] for every event except
/// transient `audio` chunks.
pub struct DebounceHandler {
    debouncer: Debouncer,
}

impl DebounceHandler {
    pub fn new(debouncer: Debouncer) -> Self {
        DebounceHandler { debouncer }
    }
}

impl Handler for DebounceHandler {
    fn handle(&self, event: &Event) {
        if event.meta.event_type != AUDIO {
            self.debouncer.touch();
        }
    }
}

/// Drains `rx` until it closes or `cancel` is signalled, invoking `on_tick`
/// for each drained notification. `on_tick` is not invoked again until the
/// previous call returns, so a slow consumer naturally coalesces further
/// touches that arrive while it's running.
pub async fn run_drain_loop<F, Fut>(
    mut rx: mpsc::Receiver<()>,
    mut cancel: watch::Receiver<bool>,
    on_tick: F,
) where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    break;
                }
            }
            msg = rx.recv() => {
                match msg {
                    Some(()) => on_tick().await,
                    None => break,
                }
            }
        }
    }
}

#[allow(dead_code)]
pub fn as_handler(debouncer: Debouncer) -> Arc<dyn Handler> {
    Arc::new(DebounceHandler::new(debouncer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Timestamp;
    use std::sync::Weak;

    fn audio_event() -> Event {
        Event::new(AUDIO, Timestamp::ZERO, Timestamp::ZERO, (), Weak::new())
    }

    fn other_event() -> Event {
        Event::new("transcription", Timestamp::ZERO, Timestamp::ZERO, (), Weak::new())
    }

    #[test]
    fn audio_events_do_not_touch_the_debouncer() {
        let (debouncer, mut rx) = Debouncer::new();
        let handler = DebounceHandler::new(debouncer);
        handler.handle(&audio_event());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn non_audio_events_touch_the_debouncer_and_coalesce() {
        let (debouncer, mut rx) = Debouncer::new();
        let handler = DebounceHandler::new(debouncer);
        handler.handle(&other_event());
        handler.handle(&other_event());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "second touch before drain must be dropped");
    }
}
