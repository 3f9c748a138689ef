//! Debounced "index invalidated" notifications.
//!
//! Subscribers only learn that the index changed; they re-fetch it through
//! `StoryIndexGenerator::get_index`.

use log::debug;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInvalidated {
    /// Reason of the last invalidation in the batch.
    pub reason: String,
    /// Invalidations folded into this notification.
    pub coalesced: usize,
}

/// Leading + trailing edge debounce. The first invalidation after a quiet
/// period fires at once; later ones inside the window collapse into one
/// trailing notification, sent no later than `max_wait` after the batch began.
struct DebounceState {
    debounce: Duration,
    max_wait: Duration,
    pending: usize,
    reason: Option<String>,
    first_event: Option<Instant>,
    last_event: Option<Instant>,
    quiet_until: Option<Instant>,
}

impl DebounceState {
    fn new(debounce: Duration, max_wait: Duration) -> Self {
        Self {
            debounce,
            max_wait: max_wait.max(debounce),
            pending: 0,
            reason: None,
            first_event: None,
            last_event: None,
            quiet_until: None,
        }
    }

    /// Records one invalidation; returns the leading-edge notification when
    /// the window was quiet.
    fn record_event(&mut self, reason: String, now: Instant) -> Option<IndexInvalidated> {
        let quiet = self.quiet_until.map_or(true, |until| now >= until);
        if quiet && self.pending == 0 {
            self.quiet_until = Some(now + self.debounce);
            return Some(IndexInvalidated {
                reason,
                coalesced: 1,
            });
        }
        self.pending += 1;
        self.reason = Some(reason);
        self.last_event = Some(now);
        self.first_event.get_or_insert(now);
        None
    }

    const fn pending(&self) -> usize {
        self.pending
    }

    fn next_deadline(&self) -> Option<Instant> {
        if self.pending == 0 {
            return None;
        }
        let trailing = self.last_event.map(|last| last + self.debounce);
        let forced = self.first_event.map(|first| first + self.max_wait);
        match (trailing, forced) {
            (Some(trailing), Some(forced)) => Some(trailing.min(forced)),
            (deadline, None) | (None, deadline) => deadline,
        }
    }

    /// Trailing-edge notification for everything recorded since the last one.
    fn take(&mut self, now: Instant) -> Option<IndexInvalidated> {
        if self.pending == 0 {
            return None;
        }
        let event = IndexInvalidated {
            reason: self.reason.take().unwrap_or_default(),
            coalesced: self.pending,
        };
        self.pending = 0;
        self.first_event = None;
        self.last_event = None;
        self.quiet_until = Some(now + self.debounce);
        Some(event)
    }
}

/// Owns the debounce task. Dropping the notifier stops the task.
pub struct InvalidationNotifier {
    command_tx: mpsc::Sender<String>,
    event_tx: broadcast::Sender<IndexInvalidated>,
}

impl InvalidationNotifier {
    /// Spawns the debounce task; must be called inside a tokio runtime.
    #[must_use]
    pub fn start(debounce: Duration, max_wait: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(32);
        spawn_notify_loop(
            DebounceState::new(debounce, max_wait),
            command_rx,
            event_tx.clone(),
        );
        Self {
            command_tx,
            event_tx,
        }
    }

    pub fn notify(&self, reason: impl Into<String>) {
        if let Err(e) = self.command_tx.try_send(reason.into()) {
            // A full queue already guarantees a trailing notification.
            debug!("Invalidation notification not queued: {e}");
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<IndexInvalidated> {
        self.event_tx.subscribe()
    }
}

impl std::fmt::Debug for InvalidationNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationNotifier")
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}

fn spawn_notify_loop(
    mut state: DebounceState,
    mut command_rx: mpsc::Receiver<String>,
    event_tx: broadcast::Sender<IndexInvalidated>,
) {
    tokio::spawn(async move {
        loop {
            let next_deadline = state.next_deadline();

            tokio::select! {
                command = command_rx.recv() => {
                    let Some(reason) = command else { break };
                    if let Some(event) = state.record_event(reason, Instant::now()) {
                        let _ = event_tx.send(event);
                    }
                }
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => {
                    if let Some(event) = state.take(Instant::now()) {
                        debug!("Index invalidated ({} coalesced)", event.coalesced);
                        let _ = event_tx.send(event);
                    }
                }
            }
        }
        debug!("Invalidation notifier stopped ({} pending)", state.pending());
    });
}
