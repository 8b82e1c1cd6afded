use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{
    event::{Event, ListenerId},
    limits::{MIN_FIXED_RATE, MIN_VARIABLE_RATE},
};

/// The clock a request applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateKind {
    /// The per-frame rendering clock, whose step varies from tick to tick.
    Variable,
    /// The simulation clock, which steps at a constant interval.
    Fixed,
}

impl RateKind {
    /// The smallest rate of this kind that takes part in arbitration.
    #[must_use]
    pub const fn min_rate(self) -> i32 {
        match self {
            Self::Variable => MIN_VARIABLE_RATE,
            Self::Fixed => MIN_FIXED_RATE,
        }
    }
}

/// Describes a mutation of a [`RateRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestChange {
    Value { previous: i32, value: i32 },
    Validity { is_valid: bool },
}

/// A point-in-time copy of a request's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSnapshot {
    pub kind: RateKind,
    pub value: i32,
    pub is_valid: bool,
}

#[derive(Debug)]
struct RequestState {
    value: i32,
    is_valid: bool,
}

#[derive(Debug)]
pub(crate) struct RequestInner {
    kind: RateKind,
    state: Mutex<RequestState>,
    changed: Event<RequestChange>,
}

/// A caller's desire for a minimum rate on one clock.
///
/// Requests are shared handles: clones refer to the same request, and the
/// request lives until its last handle is dropped. A controller only holds a
/// weak reference, so dropping every handle withdraws the request the next
/// time the controller arbitrates.
///
/// A value below [`RateKind::min_rate`] is accepted but never wins arbitration.
#[derive(Clone, Debug)]
pub struct RateRequest {
    inner: Arc<RequestInner>,
}

impl RateRequest {
    #[must_use]
    pub fn new(kind: RateKind, value: i32) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                kind,
                state: Mutex::new(RequestState {
                    value,
                    is_valid: true,
                }),
                changed: Event::new(),
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> RateKind {
        self.inner.kind
    }

    #[must_use]
    pub fn value(&self) -> i32 {
        self.inner.state.lock().value
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.state.lock().is_valid
    }

    #[must_use]
    pub fn snapshot(&self) -> RequestSnapshot {
        self.inner.snapshot()
    }

    /// Sets the requested rate, notifying listeners if it changed.
    pub fn set_value(&self, value: i32) {
        let previous = {
            let mut state = self.inner.state.lock();
            if state.value == value {
                return;
            }
            std::mem::replace(&mut state.value, value)
        };

        self.inner
            .changed
            .emit(&RequestChange::Value { previous, value });
    }

    /// Enables or disables the request without withdrawing it, notifying
    /// listeners if it changed.
    pub fn set_valid(&self, is_valid: bool) {
        {
            let mut state = self.inner.state.lock();
            if state.is_valid == is_valid {
                return;
            }
            state.is_valid = is_valid;
        }

        self.inner
            .changed
            .emit(&RequestChange::Validity { is_valid });
    }

    /// The notification channel fired on every mutation.
    #[must_use]
    pub fn changed(&self) -> &Event<RequestChange> {
        &self.inner.changed
    }

    /// Returns `true` if both handles refer to the same request.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakRequest {
        WeakRequest(Arc::downgrade(&self.inner))
    }
}

impl RequestInner {
    fn snapshot(&self) -> RequestSnapshot {
        let state = self.state.lock();
        RequestSnapshot {
            kind: self.kind,
            value: state.value,
            is_valid: state.is_valid,
        }
    }
}

/// A non-owning reference to a request.
#[derive(Clone, Debug)]
pub(crate) struct WeakRequest(Weak<RequestInner>);

impl WeakRequest {
    pub fn refers_to(&self, request: &RateRequest) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&request.inner))
    }

    /// The request's current fields, or `None` once it has been reclaimed.
    pub fn snapshot(&self) -> Option<RequestSnapshot> {
        self.0.upgrade().map(|inner| inner.snapshot())
    }

    /// Removes a listener if the request is still alive.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.0
            .upgrade()
            .is_some_and(|inner| inner.changed.unsubscribe(id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn record_changes(request: &RateRequest) -> Arc<Mutex<Vec<RequestChange>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        request.changed().subscribe(move |change| sink.lock().push(*change));
        seen
    }

    #[test]
    fn defaults() {
        let request = RateRequest::new(RateKind::Fixed, 30);
        assert_eq!(request.kind(), RateKind::Fixed);
        assert_eq!(request.value(), 30);
        assert!(request.is_valid());
    }

    #[test]
    fn mutation_notifies() {
        let request = RateRequest::new(RateKind::Variable, 30);
        let seen = record_changes(&request);

        request.set_value(45);
        request.set_valid(false);

        assert_eq!(
            *seen.lock(),
            vec![
                RequestChange::Value {
                    previous: 30,
                    value: 45
                },
                RequestChange::Validity { is_valid: false },
            ]
        );
    }

    #[test]
    fn unchanged_fields_do_not_notify() {
        let request = RateRequest::new(RateKind::Variable, 30);
        let seen = record_changes(&request);

        request.set_value(30);
        request.set_valid(true);

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn out_of_range_values_are_accepted() {
        let request = RateRequest::new(RateKind::Fixed, -5);
        assert_eq!(request.value(), -5);
        request.set_value(0);
        assert_eq!(request.value(), 0);
    }

    #[test]
    fn identity_follows_handles() {
        let a = RateRequest::new(RateKind::Variable, 60);
        let b = RateRequest::new(RateKind::Variable, 60);
        let a2 = a.clone();

        assert!(a.same_as(&a2));
        assert!(!a.same_as(&b));

        let weak = a.downgrade();
        assert!(weak.refers_to(&a2));
        assert!(!weak.refers_to(&b));
    }

    #[test]
    fn weak_reference_expires_with_last_handle() {
        let a = RateRequest::new(RateKind::Variable, 60);
        let a2 = a.clone();
        let weak = a.downgrade();

        drop(a);
        assert!(weak.snapshot().is_some());

        drop(a2);
        assert!(weak.snapshot().is_none());
    }

    #[test]
    fn listener_can_read_request_during_notify() {
        let request = RateRequest::new(RateKind::Variable, 30);
        let observed = Arc::new(AtomicUsize::new(0));

        {
            let weak = request.downgrade();
            let observed = observed.clone();
            request.changed().subscribe(move |_| {
                if let Some(snapshot) = weak.snapshot() {
                    observed.store(snapshot.value as usize, Ordering::Relaxed);
                }
            });
        }

        request.set_value(72);
        assert_eq!(observed.load(Ordering::Relaxed), 72);
    }
}
