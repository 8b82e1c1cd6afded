use std::collections::VecDeque;

/// Rolling-window average of per-tick rate samples.
///
/// The window always holds at least one sample, so a window of zero behaves
/// like a window of one.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    samples: VecDeque<i32>,
    window: usize,
}

impl RateEstimator {
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(window.max(1)),
            window,
        }
    }

    #[must_use]
    pub fn sample_window(&self) -> usize {
        self.window
    }

    /// Resizes the window. Shrinking discards the oldest samples immediately.
    pub fn set_sample_window(&mut self, window: usize) {
        self.window = window;
        self.truncate();
    }

    pub fn add_sample(&mut self, instant_rate: i32) {
        self.samples.push_back(instant_rate);
        self.truncate();
    }

    /// The mean of the retained samples, rounded half away from zero.
    ///
    /// Returns `None` if no sample has been added yet.
    #[must_use]
    pub fn current_estimate(&self) -> Option<i32> {
        if self.samples.is_empty() {
            return None;
        }

        let sum: i64 = self.samples.iter().map(|&s| i64::from(s)).sum();

        #[allow(clippy::cast_precision_loss)]
        let mean = sum as f64 / self.samples.len() as f64;

        // the mean of i32 samples always fits in i32
        #[allow(clippy::cast_possible_truncation)]
        let estimate = mean.round() as i32;
        Some(estimate)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    fn truncate(&mut self) {
        let limit = self.window.max(1);
        while self.samples.len() > limit {
            self.samples.pop_front();
        }
    }
}
