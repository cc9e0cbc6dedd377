//! ObservableStream<T> — a multicast, non-replaying channel with a terminal
//! completion signal.
//!
//! Emission is synchronous and ordered by subscription. A snapshot of the
//! listener list is taken under the lock and callbacks run after it is
//! released, so listeners may subscribe or unsubscribe from inside a
//! callback. Additions made during an emission only see later events.
//!
//! Once [`ObservableStream::notify_destroyed`] has fired, the stream is
//! closed for good: later subscribers get the completion immediately and
//! are never registered, and further values are dropped.

use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`ObservableStream::subscribe`].
pub type SubscriberId = u64;

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<T> {
    /// A value emitted after the subscriber registered.
    Next(T),
    /// Terminal completion. Delivered at most once per subscriber.
    Complete,
}

/// Closure type for stream listeners.
pub type ListenerFn<T> = dyn Fn(&Notification<T>) + Send + Sync;

struct StreamState<T> {
    listeners: Vec<(SubscriberId, Arc<ListenerFn<T>>)>,
    next_id: SubscriberId,
    closed: bool,
}

/// Multicast stream handle. Clones share the same subscribers.
pub struct ObservableStream<T> {
    state: Arc<Mutex<StreamState<T>>>,
}

impl<T> ObservableStream<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StreamState {
                listeners: Vec::new(),
                next_id: 1,
                closed: false,
            })),
        }
    }

    /// Register a listener.
    ///
    /// On a closed stream the listener is called with
    /// [`Notification::Complete`] before this returns and is not kept.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Notification<T>) + Send + Sync + 'static,
    ) -> SubscriberId {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            if !state.closed {
                state.listeners.push((id, Arc::new(listener)));
                return id;
            }
            id
        };

        listener(&Notification::Complete);
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.state.lock().listeners.retain(|(lid, _)| *lid != id);
    }

    /// Deliver `value` to every current subscriber, in subscription order.
    pub fn notify_changed(&self, value: T) {
        let snapshot: Vec<Arc<ListenerFn<T>>> = {
            let state = self.state.lock();
            if state.closed {
                tracing::debug!("Dropping value emitted on a closed stream");
                return;
            }
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        let event = Notification::Next(value);
        for listener in snapshot {
            listener(&event);
        }
    }

    /// Close the stream and deliver completion to current subscribers.
    ///
    /// Only the first call has any effect.
    pub fn notify_destroyed(&self) {
        let listeners = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.listeners)
        };

        for (_, listener) in listeners {
            listener(&Notification::Complete);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().listeners.len()
    }
}

impl<T> Clone for ObservableStream<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for ObservableStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ObservableStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ObservableStream")
            .field("subscribers", &state.listeners.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, tag: &'static str) -> impl Fn(&Notification<i32>) + Send + Sync {
        let log = Arc::clone(log);
        move |n| {
            let entry = match n {
                Notification::Next(v) => format!("{tag}:{v}"),
                Notification::Complete => format!("{tag}:done"),
            };
            log.lock().push(entry);
        }
    }

    #[test]
    fn late_subscribers_only_see_later_values() {
        let stream = ObservableStream::new();
        let log: Log = Arc::default();

        stream.subscribe(recorder(&log, "a"));
        stream.notify_changed(1);
        stream.subscribe(recorder(&log, "b"));
        stream.notify_changed(2);
        stream.subscribe(recorder(&log, "c"));
        stream.notify_changed(3);
        stream.notify_destroyed();

        assert_eq!(
            *log.lock(),
            vec![
                "a:1", "a:2", "b:2", "a:3", "b:3", "c:3", "a:done", "b:done", "c:done"
            ]
        );
    }

    #[test]
    fn completion_fires_once() {
        let stream = ObservableStream::new();
        let log: Log = Arc::default();
        stream.subscribe(recorder(&log, "a"));

        stream.notify_destroyed();
        stream.notify_destroyed();
        stream.notify_changed(9);

        assert_eq!(*log.lock(), vec!["a:done"]);
        assert!(stream.is_closed());
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn subscribe_after_close_completes_immediately() {
        let stream = ObservableStream::new();
        stream.notify_destroyed();

        let log: Log = Arc::default();
        stream.subscribe(recorder(&log, "late"));

        assert_eq!(*log.lock(), vec!["late:done"]);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let stream = ObservableStream::new();
        let log: Log = Arc::default();
        let id = stream.subscribe(recorder(&log, "a"));
        stream.unsubscribe(id);
        stream.unsubscribe(id);

        stream.notify_changed(1);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn listener_may_subscribe_during_emit() {
        let stream: ObservableStream<i32> = ObservableStream::new();
        let log: Log = Arc::default();

        let inner_stream = stream.clone();
        let inner_log = Arc::clone(&log);
        stream.subscribe(move |n| {
            if let Notification::Next(1) = n {
                inner_stream.subscribe(recorder(&inner_log, "nested"));
            }
        });

        stream.notify_changed(1);
        assert!(log.lock().is_empty());

        stream.notify_changed(2);
        assert_eq!(*log.lock(), vec!["nested:2"]);
    }
}
