//! Resolves competing requests into one target rate per clock.
//!
//! The highest valid request of each kind wins. Requests below their kind's
//! minimum never compete, and a clock with no competing request runs at its
//! fallback rate.

use crate::request::{RateKind, RequestSnapshot};

/// The resolved rate for each clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Targets {
    pub variable: i32,
    pub fixed: i32,
}

/// The rates used when no request competes for a clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fallback {
    pub variable: i32,
    pub fixed: i32,
}

/// Accumulates the highest demand per clock over a set of requests.
#[derive(Clone, Copy, Debug)]
pub struct Arbitration {
    best_variable: i32,
    best_fixed: i32,
}

impl Arbitration {
    #[must_use]
    pub const fn new() -> Self {
        // one below each minimum, so an untouched accumulator always falls back
        Self {
            best_variable: RateKind::Variable.min_rate() - 1,
            best_fixed: RateKind::Fixed.min_rate() - 1,
        }
    }

    /// Considers one request. Invalid requests are ignored.
    pub fn offer(&mut self, request: RequestSnapshot) {
        if !request.is_valid {
            return;
        }

        let best = match request.kind {
            RateKind::Variable => &mut self.best_variable,
            RateKind::Fixed => &mut self.best_fixed,
        };

        *best = (*best).max(request.value);
    }

    #[must_use]
    pub fn resolve(self, fallback: Fallback) -> Targets {
        let pick = |best: i32, kind: RateKind, fallback: i32| {
            if best < kind.min_rate() {
                fallback
            } else {
                best
            }
        };

        Targets {
            variable: pick(self.best_variable, RateKind::Variable, fallback.variable),
            fixed: pick(self.best_fixed, RateKind::Fixed, fallback.fixed),
        }
    }
}

impl Default for Arbitration {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the target rates for `requests`.
#[must_use]
pub fn arbitrate(requests: impl IntoIterator<Item = RequestSnapshot>, fallback: Fallback) -> Targets {
    let mut arbitration = Arbitration::new();
    for request in requests {
        arbitration.offer(request);
    }
    arbitration.resolve(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{MIN_FIXED_RATE, MIN_VARIABLE_RATE};

    const FALLBACK: Fallback = Fallback {
        variable: 30,
        fixed: 50,
    };

    fn variable(value: i32) -> RequestSnapshot {
        RequestSnapshot {
            kind: RateKind::Variable,
            value,
            is_valid: true,
        }
    }

    fn fixed(value: i32) -> RequestSnapshot {
        RequestSnapshot {
            kind: RateKind::Fixed,
            value,
            is_valid: true,
        }
    }

    fn invalid(mut request: RequestSnapshot) -> RequestSnapshot {
        request.is_valid = false;
        request
    }

    #[test]
    fn empty_falls_back() {
        assert_eq!(
            arbitrate(std::iter::empty(), FALLBACK),
            Targets {
                variable: 30,
                fixed: 50
            }
        );
    }

    #[test]
    fn maximum_wins_per_kind() {
        let targets = arbitrate(
            [variable(45), fixed(100), variable(144), fixed(60), variable(60)],
            FALLBACK,
        );

        assert_eq!(
            targets,
            Targets {
                variable: 144,
                fixed: 100
            }
        );
    }

    #[test]
    fn maximum_may_be_below_fallback() {
        let targets = arbitrate([variable(20), fixed(20)], FALLBACK);
        assert_eq!(
            targets,
            Targets {
                variable: 20,
                fixed: 20
            }
        );
    }

    #[test]
    fn invalid_requests_do_not_compete() {
        let targets = arbitrate([invalid(variable(240)), variable(75), invalid(fixed(120))], FALLBACK);
        assert_eq!(
            targets,
            Targets {
                variable: 75,
                fixed: 50
            }
        );
    }

    #[test]
    fn below_minimum_does_not_compete() {
        let targets = arbitrate(
            [
                variable(MIN_VARIABLE_RATE - 1),
                variable(-60),
                fixed(MIN_FIXED_RATE - 1),
            ],
            FALLBACK,
        );
        assert_eq!(targets, Targets { variable: 30, fixed: 50 });
    }

    #[test]
    fn minimum_is_inclusive() {
        let targets = arbitrate([variable(MIN_VARIABLE_RATE), fixed(MIN_FIXED_RATE)], FALLBACK);
        assert_eq!(
            targets,
            Targets {
                variable: MIN_VARIABLE_RATE,
                fixed: MIN_FIXED_RATE
            }
        );
    }

    #[test]
    fn kinds_are_independent() {
        let targets = arbitrate([fixed(200)], FALLBACK);
        assert_eq!(targets.variable, 30);
        assert_eq!(targets.fixed, 200);
    }
}
