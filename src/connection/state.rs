//! Lifecycle states, transition rules and listener fan-out.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::{Result, SyncError};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No transport, ready to connect.
    Disconnected,
    /// Transport handshake in progress.
    Connecting,
    /// Transport open; sending is allowed.
    Open,
    /// Local close requested; no further inbound dispatch.
    Closing,
    /// Transport failed or was closed by the peer.
    Closed,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Open)
                | (Connecting, Closed)
                | (Open, Closing)
                | (Open, Closed)
                | (Closing, Disconnected)
                | (Closed, Disconnected)
        )
    }

    /// Upper-case wire name, e.g. `"OPEN"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted to listeners on every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
    /// State before the transition.
    pub previous: ConnectionState,
    /// State after the transition.
    pub state: ConnectionState,
    /// When the transition happened.
    pub at: DateTime<Utc>,
    /// Failure or close reason, set on `Closed` transitions.
    pub reason: Option<String>,
}

/// Observer of lifecycle transitions.
///
/// Called synchronously on whichever task performed the transition. Keep
/// implementations short; they must not block.
pub trait StateListener: Send + Sync + 'static {
    fn on_state_change(&self, event: &LifecycleEvent);
}

impl<F> StateListener for F
where
    F: Fn(&LifecycleEvent) + Send + Sync + 'static,
{
    fn on_state_change(&self, event: &LifecycleEvent) {
        (self)(event)
    }
}

/// Events committed but not yet delivered, and whether some caller is
/// currently delivering them.
#[derive(Default)]
struct Fanout {
    queue: VecDeque<LifecycleEvent>,
    delivering: bool,
}

/// Sole owner of the connection state.
///
/// The current state lives in a `watch` channel so tasks can await
/// changes. Listeners get one [`LifecycleEvent`] per transition, in commit
/// order: each event is queued under the same lock that commits it, and a
/// single caller at a time delivers the queue. A transition may therefore
/// return before its event reaches the listeners, if another caller is
/// mid-delivery.
pub(crate) struct Lifecycle {
    state: watch::Sender<ConnectionState>,
    listeners: RwLock<Vec<Arc<dyn StateListener>>>,
    fanout: Mutex<Fanout>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            listeners: RwLock::new(Vec::new()),
            fanout: Mutex::new(Fanout::default()),
        }
    }

    pub(crate) fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn StateListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Move to `to` if legal, then notify listeners.
    pub(crate) fn transition(
        &self,
        to: ConnectionState,
        reason: Option<String>,
    ) -> Result<LifecycleEvent> {
        let mut fanout = self.fanout.lock().unwrap_or_else(PoisonError::into_inner);

        let mut from = to;
        let changed = self.state.send_if_modified(|state| {
            from = *state;
            if state.can_transition_to(to) {
                *state = to;
                true
            } else {
                false
            }
        });

        if !changed {
            return Err(SyncError::InvalidTransition { from, to });
        }

        let event = LifecycleEvent {
            previous: from,
            state: to,
            at: Utc::now(),
            reason,
        };

        match &event.reason {
            Some(reason) => tracing::debug!("Connection {} -> {} ({})", from, to, reason),
            None => tracing::debug!("Connection {} -> {}", from, to),
        }

        fanout.queue.push_back(event.clone());
        if fanout.delivering {
            return Ok(event);
        }
        fanout.delivering = true;
        drop(fanout);

        self.deliver();
        Ok(event)
    }

    /// Drain the queue to listeners. Listeners run without the fan-out lock
    /// held, so they may trigger further transitions.
    fn deliver(&self) {
        let mut delivering = Delivering {
            fanout: &self.fanout,
            armed: true,
        };

        loop {
            let event = {
                let mut fanout = self.fanout.lock().unwrap_or_else(PoisonError::into_inner);
                match fanout.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        fanout.delivering = false;
                        delivering.armed = false;
                        return;
                    }
                }
            };

            // Snapshot so listeners may register further listeners.
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for listener in listeners {
                listener.on_state_change(&event);
            }
        }
    }
}

/// Hands delivery back if a listener panics.
struct Delivering<'a> {
    fanout: &'a Mutex<Fanout>,
    armed: bool,
}

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.fanout
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .delivering = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ConnectionState::*;

    const ALL: [ConnectionState; 5] = [Disconnected, Connecting, Open, Closing, Closed];

    #[test]
    fn test_legal_transitions() {
        let legal = [
            (Disconnected, Connecting),
            (Connecting, Open),
            (Connecting, Closed),
            (Open, Closing),
            (Open, Closed),
            (Closing, Disconnected),
            (Closed, Disconnected),
        ];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_open_requires_connecting() {
        assert!(!Disconnected.can_transition_to(Open));
    }

    #[test]
    fn test_transition_updates_state() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.current(), Disconnected);

        let event = lifecycle.transition(Connecting, None).unwrap();
        assert_eq!(event.previous, Disconnected);
        assert_eq!(event.state, Connecting);
        assert_eq!(lifecycle.current(), Connecting);
    }

    #[test]
    fn test_illegal_transition_leaves_state() {
        let lifecycle = Lifecycle::new();

        let err = lifecycle.transition(Open, None).unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidTransition {
                from: Disconnected,
                to: Open
            }
        ));
        assert_eq!(lifecycle.current(), Disconnected);
    }

    #[test]
    fn test_listeners_see_every_transition() {
        let lifecycle = Lifecycle::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        lifecycle.add_listener(Arc::new(move |event: &LifecycleEvent| {
            s.lock().unwrap().push((event.state, event.reason.clone()));
        }));

        lifecycle.transition(Connecting, None).unwrap();
        lifecycle
            .transition(Closed, Some("refused".to_string()))
            .unwrap();
        lifecycle.transition(Disconnected, None).unwrap();
        let _ = lifecycle.transition(Closing, None);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (Connecting, None),
                (Closed, Some("refused".to_string())),
                (Disconnected, None),
            ]
        );
    }

    #[test]
    fn test_events_delivered_in_commit_order_across_threads() {
        let lifecycle = Arc::new(Lifecycle::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        lifecycle.add_listener(Arc::new(move |event: &LifecycleEvent| {
            if event.state == Closing {
                std::thread::sleep(Duration::from_millis(50));
            }
            s.lock().unwrap().push(event.state);
        }));
        lifecycle.transition(Connecting, None).unwrap();
        lifecycle.transition(Open, None).unwrap();

        let l = lifecycle.clone();
        let closer = std::thread::spawn(move || {
            l.transition(Closing, None).unwrap();
        });
        while lifecycle.current() != Closing {
            std::thread::yield_now();
        }
        // Committed while the closer is still notifying about Closing.
        lifecycle.transition(Disconnected, None).unwrap();
        closer.join().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Connecting, Open, Closing, Disconnected]
        );
    }

    #[test]
    fn test_listener_may_trigger_transition() {
        let lifecycle = Arc::new(Lifecycle::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let weak = Arc::downgrade(&lifecycle);
        lifecycle.add_listener(Arc::new(move |event: &LifecycleEvent| {
            s.lock().unwrap().push(event.state);
            if event.state == Closed {
                if let Some(lifecycle) = weak.upgrade() {
                    lifecycle.transition(Disconnected, None).unwrap();
                }
            }
        }));

        lifecycle.transition(Connecting, None).unwrap();
        lifecycle.transition(Closed, None).unwrap();

        assert_eq!(lifecycle.current(), Disconnected);
        assert_eq!(*seen.lock().unwrap(), vec![Connecting, Closed, Disconnected]);
    }

    #[test]
    fn test_panicking_listener_does_not_stall_delivery() {
        let lifecycle = Lifecycle::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        lifecycle.add_listener(Arc::new(move |event: &LifecycleEvent| {
            if event.state == Connecting {
                panic!("listener failed");
            }
            s.lock().unwrap().push(event.state);
        }));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            lifecycle.transition(Connecting, None)
        }));
        assert!(result.is_err());

        lifecycle.transition(Closed, None).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Closed]);
    }

    #[test]
    fn test_subscriber_observes_latest_state() {
        let lifecycle = Lifecycle::new();
        let rx = lifecycle.subscribe();

        lifecycle.transition(Connecting, None).unwrap();
        lifecycle.transition(Open, None).unwrap();

        assert_eq!(*rx.borrow(), Open);
    }

    #[test]
    fn test_state_serializes_screaming_case() {
        let json = serde_json::to_string(&Closing).unwrap();
        assert_eq!(json, "\"CLOSING\"");
    }
}
