use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Fans one event channel out to any number of subscribers.
///
/// Events are forwarded by a dedicated thread so the producer only ever does
/// an unbounded `send`. A [`EventRelay::buffered`] relay holds events until
/// its first subscriber attaches, so a fast producer cannot outrun it. A
/// relay created with [`EventRelay::replaying`] keeps the last event and hands
/// it to subscribers that arrive later.
pub struct EventRelay<T> {
    state: Arc<Mutex<RelayState<T>>>,
}

struct RelayState<T> {
    subscribers: Vec<Sender<T>>,
    last: Option<T>,
    /// Events published before anyone subscribed.
    backlog: Vec<T>,
    attached: bool,
    replay_last: bool,
    closed: bool,
}

impl<T> Clone for EventRelay<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> EventRelay<T> {
    /// Relay that delivers every event to the subscribers present when it is
    /// published; events published before the first subscription go to that
    /// first subscriber.
    pub fn buffered() -> Self {
        Self::with_replay(false)
    }

    /// Relay that also replays its most recent event to late subscribers.
    pub fn replaying() -> Self {
        Self::with_replay(true)
    }

    fn with_replay(replay_last: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState {
                subscribers: Vec::new(),
                last: None,
                backlog: Vec::new(),
                attached: false,
                replay_last,
                closed: false,
            })),
        }
    }

    /// Register an observer. After the source closed the receiver yields the
    /// replayed event, if any, and then disconnects.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = mpsc::channel();
        let mut state = self.lock();
        if state.replay_last
            && let Some(last) = &state.last
        {
            let _ = tx.send(last.clone());
        }
        if !state.attached {
            state.attached = true;
            for event in state.backlog.drain(..) {
                let _ = tx.send(event);
            }
        }
        if !state.closed {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Most recent event, for replaying relays.
    pub fn last(&self) -> Option<T> {
        self.lock().last.clone()
    }

    pub fn publish(&self, event: T) {
        let mut state = self.lock();
        if state.replay_last {
            state
                .subscribers
                .retain(|subscriber| subscriber.send(event.clone()).is_ok());
            state.last = Some(event);
        } else if !state.attached {
            state.backlog.push(event);
        } else {
            state
                .subscribers
                .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        }
    }

    /// Disconnect every subscriber; later subscribers only get the replay or
    /// the backlog.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.subscribers.clear();
    }

    /// Forward everything from `source` until it closes, then close the relay.
    pub fn forward(&self, source: Receiver<T>, name: &str) -> std::io::Result<JoinHandle<()>> {
        let relay = self.clone();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for event in source {
                    relay.publish(event);
                }
                relay.close();
            })
    }

    fn lock(&self) -> MutexGuard<'_, RelayState<T>> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_relay_fans_out_and_closes() {
        let relay = EventRelay::buffered();
        let a = relay.subscribe();
        let b = relay.subscribe();
        let (tx, rx) = mpsc::channel();
        let handle = relay.forward(rx, "relay-test").unwrap();
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        drop(tx);
        handle.join().unwrap();
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(relay.subscribe().recv().is_err());
    }

    #[test]
    fn buffered_relay_keeps_events_for_first_subscriber() {
        let relay = EventRelay::buffered();
        relay.publish(1);
        relay.publish(2);
        relay.close();
        let first = relay.subscribe();
        let second = relay.subscribe();
        assert_eq!(first.iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(second.recv().is_err());
    }

    #[test]
    fn replaying_relay_serves_late_subscribers() {
        let relay = EventRelay::replaying();
        relay.publish("first");
        relay.publish("done");
        relay.close();
        let late = relay.subscribe();
        assert_eq!(late.iter().collect::<Vec<_>>(), vec!["done"]);
        assert_eq!(relay.last(), Some("done"));
    }
}
