use std::{
    cell::Cell,
    sync::{Arc, Weak},
};

use arrayvec::ArrayVec;
use bitflags::bitflags;
use parking_lot::{Mutex, ReentrantMutex};

use crate::{
    arbiter::{Arbitration, Fallback},
    estimator::RateEstimator,
    event::{Event, ListenerId},
    host::HostClock,
    limits::{
        DEFAULT_FALLBACK_FIXED_RATE, DEFAULT_FALLBACK_VARIABLE_RATE, DEFAULT_SAMPLE_WINDOW,
        MAX_CHANGES_PER_PASS, MIN_SAMPLE_WINDOW, RECOMMENDED_MAX_SAMPLE_WINDOW,
    },
    registry::Registry,
    request::{RateRequest, RequestChange},
    time, Error,
};

bitflags! {
    /// Selects which of the controller's rates a listener is notified about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RateFields: u8 {
        const CURRENT_VARIABLE = 1 << 0;
        const CURRENT_FIXED = 1 << 1;
        const TARGET_VARIABLE = 1 << 2;
        const TARGET_FIXED = 1 << 3;

        const CURRENT = Self::CURRENT_VARIABLE.bits() | Self::CURRENT_FIXED.bits();
        const TARGET = Self::TARGET_VARIABLE.bits() | Self::TARGET_FIXED.bits();
    }
}

/// A change to one of the controller's rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateChange {
    /// Exactly one of the four single-rate flags.
    pub field: RateFields,
    /// `None` if the rate had not been set before.
    pub previous: Option<i32>,
    pub value: i32,
}

/// The controller's measured and resolved rates. Unset until the first
/// measurement or arbitration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateStatus {
    pub current_variable: Option<i32>,
    pub current_fixed: Option<i32>,
    pub target_variable: Option<i32>,
    pub target_fixed: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, but not yet started. Requests are recorded but not
    /// arbitrated and ticks are ignored.
    Uninitialized,
    Running,
    /// Internal teardown state, never returned by [`RateController::lifecycle`].
    Destroyed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The number of variable clock samples averaged into the current rate.
    pub sample_window: usize,
    /// The variable clock rate used when no valid request competes.
    pub fallback_variable_rate: i32,
    /// The fixed clock rate used when no valid request competes.
    pub fallback_fixed_rate: i32,
}

impl Config {
    /// # Errors
    ///
    /// Returns an error if `sample_window` is zero.
    pub fn validate(&self) -> Result<(), Error> {
        validate_sample_window(self.sample_window)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_window: DEFAULT_SAMPLE_WINDOW,
            fallback_variable_rate: DEFAULT_FALLBACK_VARIABLE_RATE,
            fallback_fixed_rate: DEFAULT_FALLBACK_FIXED_RATE,
        }
    }
}

fn validate_sample_window(window: usize) -> Result<(), Error> {
    if window < MIN_SAMPLE_WINDOW {
        Err(Error::InvalidSampleWindow(window))
    } else {
        Ok(())
    }
}

type Changes = ArrayVec<RateChange, MAX_CHANGES_PER_PASS>;

/// The changes of one pass, numbered consecutively from `first` in the order
/// they were applied.
struct Pass {
    first: u64,
    changes: Changes,
}

/// Resolves rate requests into target rates for the host's variable and fixed
/// clocks, and measures the rates the clocks actually achieve.
///
/// Every operation runs to completion before returning. The controller may be
/// shared between threads; its state sits behind a single lock, and listeners
/// are invoked after that lock is released so they may call back into the
/// controller or mutate requests. Listeners see the changes to each rate in
/// the order they were applied, and never end on a superseded value.
///
/// Dropping the controller unsubscribes it from every registered request.
pub struct RateController<H: HostClock> {
    shared: Arc<Shared<H>>,
}

struct Shared<H: HostClock> {
    state: Mutex<State<H>>,
    changed: Event<RateChange>,
    /// The sequence number of the last change delivered, per rate field.
    delivered: ReentrantMutex<[Cell<u64>; 4]>,
}

struct State<H: HostClock> {
    lifecycle: Lifecycle,
    host: H,
    registry: Registry,
    estimator: RateEstimator,
    fallback: Fallback,
    status: RateStatus,
    warned_unsupported: bool,
    sequence: u64,
}

impl<H: HostClock> RateController<H> {
    /// Creates a controller in the [`Lifecycle::Uninitialized`] state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &Config, host: H) -> Result<Self, Error> {
        config.validate()?;

        let state = State {
            lifecycle: Lifecycle::Uninitialized,
            host,
            registry: Registry::new(),
            estimator: RateEstimator::new(config.sample_window),
            fallback: Fallback {
                variable: config.fallback_variable_rate,
                fixed: config.fallback_fixed_rate,
            },
            status: RateStatus::default(),
            warned_unsupported: false,
            sequence: 0,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                changed: Event::new(),
                delivered: ReentrantMutex::new(Default::default()),
            }),
        })
    }

    /// Moves the controller to [`Lifecycle::Running`] and resolves the initial
    /// targets. Later calls do nothing.
    pub fn start(&self) {
        let pass = {
            let mut state = self.shared.state.lock();
            if state.lifecycle != Lifecycle::Uninitialized {
                return;
            }

            state.lifecycle = Lifecycle::Running;
            state.check_rate_control();
            let changes = state.arbitrate();

            tracing::info!(
                requests = state.registry.len(),
                target_variable = ?state.status.target_variable,
                target_fixed = ?state.status.target_fixed,
                "Rate controller started"
            );

            state.seal(changes)
        };

        self.shared.notify(&pass);
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.state.lock().lifecycle
    }

    /// Tears the controller down. Equivalent to dropping it.
    pub fn destroy(self) {}

    /// Registers a request and re-arbitrates. Returns `false` if the request
    /// was already registered.
    pub fn add_request(&self, request: &RateRequest) -> bool {
        let listener = self.request_listener();

        let pass = {
            let mut state = self.shared.state.lock();
            if !state.registry.add(request, listener) {
                return false;
            }
            let changes = state.arbitrate();
            state.seal(changes)
        };

        self.shared.notify(&pass);
        true
    }

    /// Withdraws a request and re-arbitrates. Returns `false` if the request
    /// was not registered.
    pub fn remove_request(&self, request: &RateRequest) -> bool {
        let pass = {
            let mut state = self.shared.state.lock();
            if !state.registry.remove(request) {
                return false;
            }
            let changes = state.arbitrate();
            state.seal(changes)
        };

        self.shared.notify(&pass);
        true
    }

    #[must_use]
    pub fn contains_request(&self, request: &RateRequest) -> bool {
        self.shared.state.lock().registry.contains(request)
    }

    /// The number of registered requests, including reclaimed ones that have
    /// not been pruned yet.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    /// Registers `request` for as long as the returned guard lives.
    ///
    /// The request is removed when the guard drops, even if it had been
    /// registered before.
    #[must_use]
    pub fn enroll(&self, request: &RateRequest) -> Enrollment<'_, H> {
        self.add_request(request);
        Enrollment {
            controller: self,
            request: request.clone(),
        }
    }

    /// Records one variable clock tick that took `elapsed_seconds`, then
    /// restores the host's variable target if something else changed it.
    ///
    /// Ticks with a non-positive or non-finite elapsed time are not measured.
    /// Hosts without rate control are never resynced.
    pub fn on_variable_tick(&self, elapsed_seconds: f64) {
        let pass = {
            let mut state = self.shared.state.lock();
            let changes = state.variable_tick(elapsed_seconds);
            state.seal(changes)
        };
        self.shared.notify(&pass);
    }

    /// Records one fixed clock tick that took `elapsed_seconds`, then
    /// restores the host's fixed step interval if something else changed it.
    ///
    /// Unlike the variable clock, the fixed clock's measured rate is not
    /// smoothed.
    pub fn on_fixed_tick(&self, elapsed_seconds: f64) {
        let pass = {
            let mut state = self.shared.state.lock();
            let changes = state.fixed_tick(elapsed_seconds);
            state.seal(changes)
        };
        self.shared.notify(&pass);
    }

    #[must_use]
    pub fn status(&self) -> RateStatus {
        self.shared.state.lock().status
    }

    #[must_use]
    pub fn current_variable_rate(&self) -> Option<i32> {
        self.status().current_variable
    }

    #[must_use]
    pub fn current_fixed_rate(&self) -> Option<i32> {
        self.status().current_fixed
    }

    #[must_use]
    pub fn target_variable_rate(&self) -> Option<i32> {
        self.status().target_variable
    }

    #[must_use]
    pub fn target_fixed_rate(&self) -> Option<i32> {
        self.status().target_fixed
    }

    #[must_use]
    pub fn fallback_variable_rate(&self) -> i32 {
        self.shared.state.lock().fallback.variable
    }

    #[must_use]
    pub fn fallback_fixed_rate(&self) -> i32 {
        self.shared.state.lock().fallback.fixed
    }

    /// Sets the variable clock's fallback. Takes effect immediately while the
    /// host is running, otherwise on the next arbitration.
    pub fn set_fallback_variable_rate(&self, rate: i32) {
        self.set_fallback(|fallback| fallback.variable = rate);
    }

    /// Sets the fixed clock's fallback. Takes effect immediately while the
    /// host is running, otherwise on the next arbitration.
    pub fn set_fallback_fixed_rate(&self, rate: i32) {
        self.set_fallback(|fallback| fallback.fixed = rate);
    }

    #[must_use]
    pub fn sample_window(&self) -> usize {
        self.shared.state.lock().estimator.sample_window()
    }

    /// Resizes the variable clock's smoothing window.
    ///
    /// # Errors
    ///
    /// Returns an error if `window` is zero. The previous window is kept.
    pub fn set_sample_window(&self, window: usize) -> Result<(), Error> {
        validate_sample_window(window)?;

        if window > RECOMMENDED_MAX_SAMPLE_WINDOW {
            tracing::debug!(window, "Sample window is larger than recommended");
        }

        self.shared.state.lock().estimator.set_sample_window(window);
        Ok(())
    }

    /// Subscribes to changes of the rates selected by `fields`.
    pub fn on_change(
        &self,
        fields: RateFields,
        listener: impl Fn(&RateChange) + Send + Sync + 'static,
    ) -> ListenerId {
        self.shared.changed.subscribe(move |change| {
            if fields.intersects(change.field) {
                listener(change);
            }
        })
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.changed.unsubscribe(id)
    }

    /// Runs `f` with the host adapter. `f` must not call back into the
    /// controller.
    pub fn host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.shared.state.lock().host)
    }

    /// Runs `f` with mutable access to the host adapter. `f` must not call
    /// back into the controller.
    pub fn host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.shared.state.lock().host)
    }

    fn set_fallback(&self, apply: impl FnOnce(&mut Fallback)) {
        let pass = {
            let mut state = self.shared.state.lock();
            apply(&mut state.fallback);

            let changes = if state.host.is_running() {
                state.arbitrate()
            } else {
                Changes::new()
            };
            state.seal(changes)
        };

        self.shared.notify(&pass);
    }

    fn request_listener(&self) -> impl Fn(&RequestChange) + Send + Sync + 'static {
        let shared: Weak<Shared<H>> = Arc::downgrade(&self.shared);

        move |_: &RequestChange| {
            if let Some(shared) = shared.upgrade() {
                shared.rearbitrate();
            }
        }
    }
}

impl<H: HostClock> Drop for RateController<H> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.lifecycle = Lifecycle::Destroyed;
        state.registry.clear();
        state.estimator.clear();
        state.status = RateStatus::default();

        tracing::info!("Rate controller destroyed");
    }
}

/// Keeps a request registered with a [`RateController`] until dropped.
pub struct Enrollment<'a, H: HostClock> {
    controller: &'a RateController<H>,
    request: RateRequest,
}

impl<H: HostClock> Enrollment<'_, H> {
    #[must_use]
    pub fn request(&self) -> &RateRequest {
        &self.request
    }
}

impl<H: HostClock> Drop for Enrollment<'_, H> {
    fn drop(&mut self) {
        self.controller.remove_request(&self.request);
    }
}

impl<H: HostClock> Shared<H> {
    fn rearbitrate(&self) {
        let pass = {
            let mut state = self.state.lock();
            let changes = state.arbitrate();
            state.seal(changes)
        };
        self.notify(&pass);
    }

    /// Delivers a pass, dropping any change that a later pass has already
    /// superseded.
    ///
    /// The delivery lock is re-entrant, so a listener on this thread may call
    /// back into the controller and have its own pass delivered inline. Other
    /// threads wait, which keeps delivery in application order. The state lock
    /// is never held while taking it.
    fn notify(&self, pass: &Pass) {
        if pass.changes.is_empty() {
            return;
        }

        let delivered = self.delivered.lock();
        for (sequence, change) in (pass.first..).zip(&pass.changes) {
            let last = &delivered[field_slot(change.field)];
            if sequence <= last.get() {
                tracing::trace!(
                    field = ?change.field,
                    value = change.value,
                    "Dropping superseded rate change"
                );
                continue;
            }

            last.set(sequence);
            self.changed.emit(change);
        }
    }
}

impl<H: HostClock> State<H> {
    /// Numbers `changes` in the order they were applied.
    fn seal(&mut self, changes: Changes) -> Pass {
        let first = self.sequence + 1;
        self.sequence += changes.len() as u64;
        Pass { first, changes }
    }

    fn arbitrate(&mut self) -> Changes {
        let mut changes = Changes::new();
        if self.lifecycle != Lifecycle::Running {
            return changes;
        }

        #[cfg(feature = "profile")]
        let _s = tracing_tracy::client::span!("arbitrate");

        let mut arbitration = Arbitration::new();
        let pruned = self.registry.scan(|request| arbitration.offer(request));
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned reclaimed rate requests");
        }

        let targets = arbitration.resolve(self.fallback);
        changes.extend(self.set_target_variable(targets.variable));
        changes.extend(self.set_target_fixed(targets.fixed));
        changes
    }

    fn set_target_variable(&mut self, rate: i32) -> Option<RateChange> {
        let change = update(
            &mut self.status.target_variable,
            rate,
            RateFields::TARGET_VARIABLE,
        )?;

        tracing::debug!(previous = ?change.previous, rate, "Variable clock target changed");
        self.write_variable(rate);
        Some(change)
    }

    fn set_target_fixed(&mut self, rate: i32) -> Option<RateChange> {
        let change = update(&mut self.status.target_fixed, rate, RateFields::TARGET_FIXED)?;

        tracing::debug!(previous = ?change.previous, rate, "Fixed clock target changed");
        self.write_fixed(rate);
        Some(change)
    }

    fn write_variable(&mut self, rate: i32) {
        self.check_rate_control();
        self.host.set_variable_target_rate(rate);
    }

    fn write_fixed(&mut self, rate: i32) {
        self.check_rate_control();

        if let Some(interval) = time::step_interval(rate) {
            self.host.set_fixed_step_interval(interval);
        } else {
            tracing::warn!(rate, "Fixed clock target has no step interval, host left unchanged");
        }
    }

    fn check_rate_control(&mut self) {
        if !self.warned_unsupported && !self.host.is_rate_control_supported() {
            self.warned_unsupported = true;
            tracing::warn!("Host does not support rate control, targets may be ignored");
        }
    }

    fn variable_tick(&mut self, elapsed_seconds: f64) -> Changes {
        let mut changes = Changes::new();
        if self.lifecycle != Lifecycle::Running {
            return changes;
        }

        if let Some(instant) = time::rate_from_elapsed(elapsed_seconds) {
            self.estimator.add_sample(instant);

            if let Some(estimate) = self.estimator.current_estimate() {
                tracing::trace!(instant, estimate, "Variable clock tick");
                changes.extend(update(
                    &mut self.status.current_variable,
                    estimate,
                    RateFields::CURRENT_VARIABLE,
                ));
            }
        } else {
            tracing::debug!(elapsed_seconds, "Variable clock tick not measured");
        }

        if !self.host.is_rate_control_supported() {
            return changes;
        }

        if let Some(target) = self.status.target_variable {
            let actual = self.host.variable_target_rate();
            if actual != target {
                tracing::debug!(actual, target, "Host variable clock drifted, reapplying target");
                self.write_variable(target);
            }
        }

        changes
    }

    fn fixed_tick(&mut self, elapsed_seconds: f64) -> Changes {
        let mut changes = Changes::new();
        if self.lifecycle != Lifecycle::Running {
            return changes;
        }

        if let Some(instant) = time::rate_from_elapsed(elapsed_seconds) {
            tracing::trace!(instant, "Fixed clock tick");
            changes.extend(update(
                &mut self.status.current_fixed,
                instant,
                RateFields::CURRENT_FIXED,
            ));
        } else {
            tracing::debug!(elapsed_seconds, "Fixed clock tick not measured");
        }

        if !self.host.is_rate_control_supported() {
            return changes;
        }

        if let Some(interval) = self.status.target_fixed.and_then(time::step_interval) {
            let actual = self.host.fixed_step_interval();

            // both sides come from `step_interval`, so exact comparison holds
            #[allow(clippy::float_cmp)]
            let drifted = actual != interval;

            if drifted {
                tracing::debug!(actual, interval, "Host fixed clock drifted, reapplying target");
                self.host.set_fixed_step_interval(interval);
            }
        }

        changes
    }
}

fn field_slot(field: RateFields) -> usize {
    field.bits().trailing_zeros() as usize
}

fn update(slot: &mut Option<i32>, value: i32, field: RateFields) -> Option<RateChange> {
    if *slot == Some(value) {
        return None;
    }

    let previous = slot.replace(value);
    Some(RateChange {
        field,
        previous,
        value,
    })
}
