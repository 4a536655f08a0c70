use std::collections::VecDeque;

/// Majority-vote smoothing over the last few raw classifications for one
/// cabin. Removes single-frame flicker without adding more than two polls of
/// lag.
pub struct DetectionSmoother {
    window: usize,
    majority: usize,
    history: VecDeque<bool>,
}

impl DetectionSmoother {
    pub fn new(window: usize, majority: usize) -> Self {
        Self {
            window,
            majority,
            history: VecDeque::with_capacity(window),
        }
    }

    /// Record the raw value and return the smoothed classification.
    ///
    /// With fewer than two samples the raw value passes through unsmoothed
    /// (bootstrap period).
    pub fn smooth(&mut self, raw: bool) -> bool {
        self.history.push_back(raw);
        while self.history.len() > self.window {
            self.history.pop_front();
        }

        if self.history.len() < 2 {
            return raw;
        }

        let active_count = self.history.iter().filter(|active| **active).count();
        active_count >= self.majority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(smoother: &mut DetectionSmoother, sequence: &[bool]) -> bool {
        let mut last = false;
        for raw in sequence {
            last = smoother.smooth(*raw);
        }
        last
    }

    #[test]
    fn two_of_three_majority_is_active() {
        let mut smoother = DetectionSmoother::new(3, 2);
        assert!(run(&mut smoother, &[true, false, true]));
    }

    #[test]
    fn single_active_frame_is_flicker() {
        let mut smoother = DetectionSmoother::new(3, 2);
        assert!(!run(&mut smoother, &[false, false, true]));
    }

    #[test]
    fn first_sample_passes_through_raw() {
        let mut active = DetectionSmoother::new(3, 2);
        assert!(active.smooth(true));

        let mut inactive = DetectionSmoother::new(3, 2);
        assert!(!inactive.smooth(false));
    }

    #[test]
    fn old_samples_fall_out_of_the_window() {
        let mut smoother = DetectionSmoother::new(3, 2);
        // Two active samples, then three inactive: the actives age out.
        assert!(!run(&mut smoother, &[true, true, false, false, false]));
    }
}
