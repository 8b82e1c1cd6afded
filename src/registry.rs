use crate::{
    event::ListenerId,
    request::{RateRequest, RequestChange, RequestSnapshot, WeakRequest},
};

#[derive(Debug)]
struct Entry {
    request: WeakRequest,
    subscription: ListenerId,
}

/// The set of active requests, in the order they were added.
///
/// The registry never keeps a request alive. Entries whose request has been
/// reclaimed are dropped by the next [`Registry::scan`].
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, request: &RateRequest) -> bool {
        self.position(request).is_some()
    }

    /// Adds `request` and subscribes `on_change` to its notifications.
    ///
    /// Returns `false` without subscribing if the request is already present.
    pub fn add(
        &mut self,
        request: &RateRequest,
        on_change: impl Fn(&RequestChange) + Send + Sync + 'static,
    ) -> bool {
        if self.contains(request) {
            return false;
        }

        let subscription = request.changed().subscribe(on_change);
        self.entries.push(Entry {
            request: request.downgrade(),
            subscription,
        });

        true
    }

    /// Removes `request` and its subscription. Returns `false` if the request
    /// was not present.
    pub fn remove(&mut self, request: &RateRequest) -> bool {
        let Some(index) = self.position(request) else {
            return false;
        };

        let entry = self.entries.remove(index);
        request.changed().unsubscribe(entry.subscription);
        true
    }

    /// Visits every live request, splicing out entries whose request has been
    /// reclaimed. Returns the number of entries pruned.
    ///
    /// Entries are scanned back to front so that removal does not disturb the
    /// indices still to be visited.
    pub fn scan(&mut self, mut visit: impl FnMut(RequestSnapshot)) -> usize {
        let mut pruned = 0;

        for index in (0..self.entries.len()).rev() {
            match self.entries[index].request.snapshot() {
                Some(snapshot) => visit(snapshot),
                None => {
                    self.entries.remove(index);
                    pruned += 1;
                }
            }
        }

        pruned
    }

    /// Removes every entry, unsubscribing from the requests that are still
    /// alive.
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            entry.request.unsubscribe(entry.subscription);
        }
    }

    /// The number of entries, including any not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, request: &RateRequest) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.request.refers_to(request))
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.clear();
    }
}
