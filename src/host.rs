/// The host environment's clock parameters.
///
/// Implementations wrap whatever the host engine exposes. They are called
/// while the controller's lock is held and must not call back into the
/// controller or mutate a registered request.
pub trait HostClock: Send + 'static {
    /// Whether the host application is running, as opposed to being
    /// configured ahead of time.
    fn is_running(&self) -> bool;

    /// Whether the host honors rate changes at all. Some hosts ignore the
    /// variable clock's target while synchronized to the display.
    fn is_rate_control_supported(&self) -> bool;

    /// The variable clock's configured rate, in ticks per second.
    fn variable_target_rate(&self) -> i32;

    fn set_variable_target_rate(&mut self, rate: i32);

    /// The fixed clock's step interval, in seconds.
    fn fixed_step_interval(&self) -> f64;

    fn set_fixed_step_interval(&mut self, interval: f64);
}

/// An in-memory host that stores what it is told.
///
/// Useful for hosts that poll their parameters each frame rather than having
/// them pushed, and for tests. Every setter call is counted, including ones
/// that write the value already stored.
#[derive(Clone, Debug, PartialEq)]
pub struct ManualHost {
    pub running: bool,
    pub rate_control_supported: bool,
    pub variable_target_rate: i32,
    pub fixed_step_interval: f64,
    pub variable_writes: usize,
    pub fixed_writes: usize,
}

impl Default for ManualHost {
    fn default() -> Self {
        Self {
            running: true,
            rate_control_supported: true,
            variable_target_rate: -1,
            fixed_step_interval: 0.02,
            variable_writes: 0,
            fixed_writes: 0,
        }
    }
}

impl HostClock for ManualHost {
    fn is_running(&self) -> bool {
        self.running
    }

    fn is_rate_control_supported(&self) -> bool {
        self.rate_control_supported
    }

    fn variable_target_rate(&self) -> i32 {
        self.variable_target_rate
    }

    fn set_variable_target_rate(&mut self, rate: i32) {
        self.variable_target_rate = rate;
        self.variable_writes += 1;
    }

    fn fixed_step_interval(&self) -> f64 {
        self.fixed_step_interval
    }

    fn set_fixed_step_interval(&mut self, interval: f64) {
        self.fixed_step_interval = interval;
        self.fixed_writes += 1;
    }
}
