//! Frame rate arbitration for a host's variable (render) and fixed
//! (simulation) clocks.
//!
//! Any number of [`RateRequest`]s ask for a minimum rate on one of the two
//! clocks. A [`RateController`] resolves them, highest valid request wins, into
//! one target per clock, pushes the targets to the host through [`HostClock`],
//! and measures the rates the clocks actually achieve from the host's ticks.
//!
//! ```
//! use pacer::{Config, ManualHost, RateController, RateKind, RateRequest};
//!
//! let controller = RateController::new(&Config::default(), ManualHost::default())?;
//! controller.start();
//!
//! let cutscene = RateRequest::new(RateKind::Variable, 120);
//! controller.add_request(&cutscene);
//! assert_eq!(controller.target_variable_rate(), Some(120));
//!
//! controller.on_variable_tick(1.0 / 118.0);
//! assert_eq!(controller.current_variable_rate(), Some(118));
//! # Ok::<(), pacer::Error>(())
//! ```

pub mod arbiter;
pub mod controller;
pub mod estimator;
pub mod event;
pub mod host;
pub mod limits;
pub mod registry;
pub mod request;
pub mod time;

pub use controller::{
    Config, Enrollment, Lifecycle, RateChange, RateController, RateFields, RateStatus,
};
pub use estimator::RateEstimator;
pub use event::{Event, ListenerId};
pub use host::{HostClock, ManualHost};
pub use request::{RateKind, RateRequest, RequestChange, RequestSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("The sample window must hold at least one sample, but {0} was given.")]
    InvalidSampleWindow(usize),
}
