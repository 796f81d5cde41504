use crate::config::types::DetectorTuning;

/**
 * Streaming push-up detector. Consumes raw pressure samples and counts one
 * repetition per change of vertical direction from moving down to moving
 * up. Counting on the upward edge only means a movement that spans many
 * samples in the same direction is still a single rep.
 *
 * All fields are mutated only through `set_running` and `on_sample`; the
 * surrounding task serializes those with the user's start/stop toggle.
 */
#[derive(Debug)]
pub struct RepDetector {
    tuning: DetectorTuning,
    running: bool,
    count: u32,
    last_pressure: Option<i64>,
    moving_up: bool,
}

impl RepDetector {
    pub fn new(tuning: DetectorTuning) -> Self {
        RepDetector {
            tuning,
            running: false,
            count: 0,
            last_pressure: None,
            moving_up: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_count(&self) -> u32 {
        self.count
    }

    /**
     * Starts or stops detection. Starting resets the count to zero and
     * discards the old baseline, so the first sample after a start never
     * produces a spurious diff. Stopping freezes the count at its current
     * value.
     */
    pub fn set_running(&mut self, running: bool) -> u32 {
        if running && !self.running {
            self.count = 0;
            self.last_pressure = None;
            self.moving_up = false;
        }
        self.running = running;
        self.count
    }

    /**
     * Feeds one pressure sample. Returns the new count when it changed.
     */
    pub fn on_sample(&mut self, pressure: u32) -> Option<u32> {
        if !self.running {
            return None;
        }

        let pressure = i64::from(pressure);
        let last_pressure = match self.last_pressure.replace(pressure) {
            // first sample after a start only seeds the baseline
            None => return None,
            Some(value) => value,
        };

        let diff = pressure - last_pressure;
        if diff.abs() > self.tuning.noise_ceiling || diff.abs() < self.tuning.noise_floor {
            // jitter around zero, or a jump too large to be a push-up
            // (e.g. the device being repositioned)
            return None;
        }

        if diff > 0 {
            // pressure rising: moving down
            self.moving_up = false;
            None
        } else if !self.moving_up {
            // pressure falling for the first time since moving down
            self.moving_up = true;
            self.count += 1;
            Some(self.count)
        } else {
            // still ascending, same rep
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_detector() -> RepDetector {
        let mut detector = RepDetector::new(DetectorTuning::default());
        detector.set_running(true);
        detector
    }

    fn feed(detector: &mut RepDetector, samples: &[u32]) {
        for &sample in samples {
            detector.on_sample(sample);
        }
    }

    #[test]
    fn samples_are_ignored_while_stopped() {
        let mut detector = RepDetector::new(DetectorTuning::default());
        feed(&mut detector, &[1000, 998, 1002, 998]);
        assert_eq!(detector.current_count(), 0);
    }

    #[test]
    fn first_sample_only_seeds_the_baseline() {
        let mut detector = started_detector();
        assert_eq!(detector.on_sample(u32::MAX), None);
        assert_eq!(detector.current_count(), 0);
        // the next falling diff counts relative to that baseline
        assert_eq!(detector.on_sample(u32::MAX - 2), Some(1));
    }

    #[test]
    fn monotonic_ascent_counts_once() {
        let mut detector = started_detector();
        feed(&mut detector, &[1000, 998, 996, 994]);
        assert_eq!(detector.current_count(), 1);
    }

    #[test]
    fn oscillation_counts_each_upward_edge() {
        let mut detector = started_detector();
        feed(&mut detector, &[1000, 1002, 998, 1002, 998]);
        assert_eq!(detector.current_count(), 2);
    }

    #[test]
    fn large_diffs_are_noise() {
        let mut detector = started_detector();
        feed(&mut detector, &[1000, 1000, 1005, 1003]);
        // +5 must not flip direction state; only the final -2 counts
        assert_eq!(detector.current_count(), 1);

        let mut detector = started_detector();
        feed(&mut detector, &[1000, 995]);
        assert_eq!(detector.current_count(), 0);
    }

    #[test]
    fn diff_of_four_is_still_movement() {
        let mut detector = started_detector();
        feed(&mut detector, &[1000, 996]);
        assert_eq!(detector.current_count(), 1);
    }

    #[test]
    fn flat_stream_never_counts() {
        let mut detector = started_detector();
        feed(&mut detector, &[1000, 1000, 1000, 1000]);
        assert_eq!(detector.current_count(), 0);
    }

    #[test]
    fn start_resets_the_count() {
        let mut detector = started_detector();
        feed(&mut detector, &[1000, 1002, 998]);
        assert_eq!(detector.current_count(), 1);

        assert_eq!(detector.set_running(false), 1);
        assert_eq!(detector.current_count(), 1);

        assert_eq!(detector.set_running(true), 0);
        assert_eq!(detector.current_count(), 0);
    }

    #[test]
    fn stop_freezes_the_count() {
        let mut detector = started_detector();
        feed(&mut detector, &[1000, 1002, 998]);
        detector.set_running(false);
        feed(&mut detector, &[1002, 998, 1002, 998]);
        assert_eq!(detector.current_count(), 1);
    }

    #[test]
    fn restart_discards_the_old_baseline() {
        let mut detector = started_detector();
        feed(&mut detector, &[1000, 1002]);
        detector.set_running(false);
        detector.set_running(true);

        // without reseeding this would be a falling diff from 1002
        assert_eq!(detector.on_sample(1000), None);
        assert_eq!(detector.current_count(), 0);
    }

    #[test]
    fn count_is_non_decreasing_while_running() {
        let mut detector = started_detector();
        let samples = [1000, 1002, 998, 1003, 999, 1010, 990, 1001, 1000, 998];
        let mut previous = detector.current_count();
        for sample in samples {
            detector.on_sample(sample);
            assert!(detector.current_count() >= previous);
            previous = detector.current_count();
        }
    }

    #[test]
    fn count_change_is_reported_exactly_when_it_happens() {
        let mut detector = started_detector();
        assert_eq!(detector.on_sample(1000), None);
        assert_eq!(detector.on_sample(1002), None);
        assert_eq!(detector.on_sample(1000), Some(1));
        assert_eq!(detector.on_sample(998), None);
    }

    #[test]
    fn wider_noise_band_is_honoured() {
        let tuning = DetectorTuning { noise_floor: 1, noise_ceiling: 8 };
        let mut detector = RepDetector::new(tuning);
        detector.set_running(true);
        feed(&mut detector, &[1000, 1006]);
        assert_eq!(detector.on_sample(1000), Some(1));
    }
}
