use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Identifies one listener registered with an [`Event`].
    pub struct ListenerId;
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Debug>::fmt(self, f)
    }
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A list of callbacks notified when something changes.
///
/// Listeners are invoked without any lock held, so a listener may subscribe,
/// unsubscribe, or trigger the same event again. A listener that is removed
/// while an emit is in flight may still observe that one emit.
pub struct Event<T> {
    listeners: Mutex<SlotMap<ListenerId, Listener<T>>>,
}

impl<T> Event<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Registers `listener`. Keep the returned id to remove it again.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        self.listeners.lock().insert(Arc::new(listener))
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.lock().remove(id).is_some()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self.listeners.lock().values().cloned().collect();

        for listener in snapshot {
            listener(value);
        }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn emit_reaches_every_listener() {
        let event = Event::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = total.clone();
            event.subscribe(move |v| {
                total.fetch_add(*v as usize, Ordering::Relaxed);
            });
        }

        event.emit(&2);
        assert_eq!(total.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let event = Event::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let id = {
            let calls = calls.clone();
            event.subscribe(move |()| {
                calls.fetch_add(1, Ordering::Relaxed);
            })
        };

        event.emit(&());
        assert!(event.unsubscribe(id));
        assert!(!event.unsubscribe(id));
        event.emit(&());

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn listener_may_reenter() {
        let event = Arc::new(Event::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let weak = Arc::downgrade(&event);
            let calls = calls.clone();
            event.subscribe(move |depth| {
                calls.fetch_add(1, Ordering::Relaxed);
                if *depth > 0 {
                    if let Some(event) = weak.upgrade() {
                        event.emit(&(depth - 1));
                    }
                }
            });
        }

        event.emit(&3);
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }
}
