use crate::{
    config::{ClassifierConfig, ConfigError, LatchPolicy},
    latch::NotificationLatch,
    types::{Movement, OccupancyPayload, StallState},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    Meters(f32),
    OutOfRange,
}

// Readings in meters; None, negative and non-finite values are faults.
pub trait RangeSampler {
    fn read_m(&mut self) -> Option<f32>;
}

impl<F> RangeSampler for F
where
    F: FnMut() -> Option<f32>,
{
    fn read_m(&mut self) -> Option<f32> {
        self()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierStep {
    pub previous: StallState,
    pub state: StallState,
    pub movement: Movement,
    pub distance: Distance,
    pub committed: bool,
    pub transition: bool,
    pub beacon: Option<bool>,
    pub interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct OccupancyClassifier {
    config: ClassifierConfig,
    state: StallState,
    range: Distance,
    last_range: Distance,
    movement: Movement,
    interval_ms: u64,
    count: u64,
}

impl OccupancyClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            interval_ms: config.low_res_interval_ms,
            config,
            state: StallState::Empty,
            range: Distance::OutOfRange,
            last_range: Distance::OutOfRange,
            movement: Movement::None,
            count: 0,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ClassifierConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn state(&self) -> StallState {
        self.state
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn payload(&self) -> OccupancyPayload {
        OccupancyPayload {
            count: self.count,
            state: self.state.code(),
        }
    }

    pub fn classify(&mut self, reading: Option<f32>) -> ClassifierStep {
        self.ingest(reading);
        self.transition()
    }

    fn ingest(&mut self, reading: Option<f32>) {
        self.movement = Movement::None;

        let Some(distance) = reading.filter(|value| value.is_finite() && *value >= 0.0) else {
            self.range = Distance::OutOfRange;
            self.last_range = Distance::OutOfRange;
            return;
        };

        self.last_range = self.range;
        self.range = Distance::Meters(distance);

        let rate = match (self.last_range, self.range) {
            (Distance::Meters(last), Distance::Meters(current)) => {
                (current - last) / self.interval_secs()
            }
            _ => 0.0,
        };

        if rate != 0.0 && rate.abs() >= self.config.min_move_rate {
            self.movement = if rate > 0.0 {
                Movement::OutOfStall
            } else {
                Movement::IntoStall
            };
        }

        // Movement is measured first so an object can be tracked leaving the window.
        if distance > self.config.range_end {
            self.range = Distance::OutOfRange;
            self.last_range = Distance::OutOfRange;
        }
    }

    fn transition(&mut self) -> ClassifierStep {
        let previous = self.state;
        let movement = self.movement;
        let distance = self.range;
        let mut committed = None;
        let mut beacon = None;

        match self.range {
            Distance::OutOfRange => {}
            Distance::Meters(range) if range > self.config.max_range => {
                committed = Some(self.commit(StallState::Empty, Distance::OutOfRange));
                beacon = Some(false);
            }
            Distance::Meters(range) if range <= self.config.occupied_upper_bound() => {
                let snapped = Distance::Meters(self.config.occupied_range);
                committed = Some(self.commit(StallState::Occupied, snapped));
                beacon = Some(true);
            }
            Distance::Meters(_) => {
                self.interval_ms = self.config.high_res_interval_ms;
                match self.movement {
                    Movement::IntoStall => self.state = StallState::Arriving,
                    Movement::OutOfStall => self.state = StallState::Departing,
                    Movement::None => {}
                }
            }
        }

        ClassifierStep {
            previous,
            state: self.state,
            movement,
            distance,
            committed: committed.is_some(),
            transition: committed.unwrap_or(false),
            beacon,
            interval_ms: self.interval_ms,
        }
    }

    fn commit(&mut self, state: StallState, snapped: Distance) -> bool {
        let changed = self.state != state;
        self.state = state;
        self.range = snapped;
        self.last_range = snapped;
        self.movement = Movement::None;
        self.interval_ms = self.config.low_res_interval_ms;
        self.count = self.count.saturating_add(1);
        changed
    }

    fn interval_secs(&self) -> f32 {
        self.interval_ms as f32 / 1_000.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub step: ClassifierStep,
    pub notify: bool,
    pub suppressed: bool,
    pub payload: OccupancyPayload,
}

#[derive(Debug)]
pub struct OccupancyDetector {
    classifier: OccupancyClassifier,
    latch: NotificationLatch,
    policy: LatchPolicy,
    transition_pending: bool,
}

impl OccupancyDetector {
    pub fn new(config: ClassifierConfig, latch: NotificationLatch, policy: LatchPolicy) -> Self {
        Self {
            classifier: OccupancyClassifier::new(config),
            latch,
            policy,
            transition_pending: false,
        }
    }

    pub fn classifier(&self) -> &OccupancyClassifier {
        &self.classifier
    }

    pub fn set_config(&mut self, config: ClassifierConfig) -> Result<(), ConfigError> {
        self.classifier.set_config(config)
    }

    pub fn latch(&self) -> &NotificationLatch {
        &self.latch
    }

    pub fn policy(&self) -> LatchPolicy {
        self.policy
    }

    pub fn is_transition_pending(&self) -> bool {
        self.transition_pending
    }

    pub fn payload(&self) -> OccupancyPayload {
        self.classifier.payload()
    }

    pub fn sample_tick<S>(&mut self, sampler: &mut S) -> TickReport
    where
        S: RangeSampler + ?Sized,
    {
        let reading = sampler.read_m();
        self.observe(reading)
    }

    pub fn observe(&mut self, reading: Option<f32>) -> TickReport {
        let step = self.classifier.classify(reading);
        if step.transition {
            self.transition_pending = true;
        }

        let mut notify = false;
        let mut suppressed = false;
        // Pending transitions are only announced on commit ticks; frozen ticks stay silent.
        if self.transition_pending && step.committed {
            if self.latch.try_consume() {
                notify = true;
                self.transition_pending = false;
            } else {
                suppressed = true;
            }
        }

        if self.policy == LatchPolicy::Auto {
            self.latch.rearm();
        }

        TickReport {
            payload: self.classifier.payload(),
            step,
            notify,
            suppressed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use pretty_assertions::assert_eq;

    use super::*;

    fn detector(policy: LatchPolicy) -> OccupancyDetector {
        OccupancyDetector::new(ClassifierConfig::default(), NotificationLatch::new(), policy)
    }

    fn run(detector: &mut OccupancyDetector, samples: &[Option<f32>]) -> Vec<TickReport> {
        let mut queue: VecDeque<Option<f32>> = samples.iter().copied().collect();
        let mut sampler = move || queue.pop_front().flatten();
        (0..samples.len())
            .map(|_| detector.sample_tick(&mut sampler))
            .collect()
    }

    #[test]
    fn approach_settles_occupied_with_single_notification() {
        let mut detector = detector(LatchPolicy::Auto);
        let samples = [Some(0.50), Some(0.30), Some(0.15), Some(0.10), Some(0.10)];

        let reports = run(&mut detector, &samples);

        let states: Vec<StallState> = reports.iter().map(|r| r.step.state).collect();
        assert_eq!(
            states,
            vec![
                StallState::Empty,
                StallState::Empty,
                StallState::Arriving,
                StallState::Occupied,
                StallState::Occupied,
            ]
        );
        let notified: Vec<usize> = reports
            .iter()
            .enumerate()
            .filter(|(_, r)| r.notify)
            .map(|(index, _)| index)
            .collect();
        assert_eq!(notified, vec![3]);
        assert_eq!(detector.classifier().state(), StallState::Occupied);
    }

    #[test]
    fn sampling_switches_to_high_resolution_inside_the_approach_band() {
        let mut detector = detector(LatchPolicy::Auto);
        let reports = run(&mut detector, &[Some(0.50), Some(0.30), Some(0.10)]);

        let intervals: Vec<u64> = reports.iter().map(|r| r.step.interval_ms).collect();
        assert_eq!(intervals, vec![1_000, 150, 1_000]);
    }

    #[test]
    fn committed_states_drive_beacon_polarity() {
        let mut detector = detector(LatchPolicy::Auto);
        let reports = run(&mut detector, &[Some(0.10), Some(0.45), Some(0.30)]);

        assert_eq!(reports[0].step.beacon, Some(true));
        assert_eq!(reports[1].step.beacon, Some(false));
        assert_eq!(reports[2].step.beacon, None);
    }

    #[test]
    fn departure_reports_departing_then_empty() {
        let mut detector = detector(LatchPolicy::Auto);
        let reports = run(
            &mut detector,
            &[Some(0.10), Some(0.20), Some(0.30), Some(0.40)],
        );

        assert_eq!(reports[0].step.state, StallState::Occupied);
        // 0.12 -> 0.20 over one second is 0.08 m/s away from the sensor.
        assert_eq!(reports[1].step.state, StallState::Departing);
        assert_eq!(reports[2].step.state, StallState::Departing);
        assert_eq!(reports[3].step.state, StallState::Empty);
        assert!(reports[0].notify);
        assert!(reports[3].notify);
        assert!(!reports[1].notify && !reports[2].notify);
    }

    #[test]
    fn sensor_fault_freezes_transient_state() {
        let mut detector = detector(LatchPolicy::Auto);
        let reports = run(
            &mut detector,
            &[Some(0.30), Some(0.20), None, Some(-1.0), Some(f32::NAN)],
        );

        assert_eq!(reports[1].step.state, StallState::Arriving);
        for report in &reports[2..] {
            assert_eq!(report.step.state, StallState::Arriving);
            assert_eq!(report.step.distance, Distance::OutOfRange);
            assert!(!report.step.committed);
            assert!(!report.notify);
        }
    }

    #[test]
    fn readings_past_range_end_read_as_out_of_range() {
        let mut detector = detector(LatchPolicy::Auto);
        let reports = run(&mut detector, &[Some(0.10), Some(0.90)]);

        assert_eq!(reports[1].step.distance, Distance::OutOfRange);
        assert_eq!(reports[1].step.movement, Movement::OutOfStall);
        // Frozen: an out-of-range reading never commits a state by itself.
        assert_eq!(reports[1].step.state, StallState::Occupied);
        assert!(!reports[1].notify);
    }

    #[test]
    fn empty_stall_stays_quiet_while_out_of_range() {
        let mut detector = detector(LatchPolicy::Auto);
        let reports = run(&mut detector, &[None, Some(2.0), Some(0.5), None]);

        assert!(reports.iter().all(|r| r.step.state == StallState::Empty));
        assert!(reports.iter().all(|r| !r.notify));
        assert_eq!(detector.payload(), OccupancyPayload { count: 1, state: 0 });
    }

    #[test]
    fn count_increments_on_every_commit() {
        let mut detector = detector(LatchPolicy::Auto);
        let reports = run(&mut detector, &[Some(0.10), Some(0.10), Some(0.25), Some(0.10)]);

        let counts: Vec<u64> = reports.iter().map(|r| r.payload.count).collect();
        assert_eq!(counts, vec![1, 2, 2, 3]);
        assert_eq!(reports[3].payload.state, StallState::Occupied.code());
    }

    #[test]
    fn closed_latch_suppresses_until_rearmed() {
        let mut detector = detector(LatchPolicy::External);
        let capture = detector.latch().clone();

        let first = detector.observe(Some(0.10));
        assert!(first.notify);
        assert!(!capture.is_armed());

        let departed = detector.observe(Some(0.45));
        assert!(!departed.notify);
        assert!(departed.suppressed);
        assert!(detector.is_transition_pending());

        let still_empty = detector.observe(Some(0.45));
        assert!(still_empty.suppressed);

        capture.rearm();
        let released = detector.observe(Some(0.45));
        assert!(released.notify);
        assert_eq!(released.payload.state, StallState::Empty.code());

        let quiet = detector.observe(Some(0.45));
        assert!(!quiet.notify);
        assert!(!quiet.suppressed);
    }

    #[test]
    fn rearmed_latch_waits_for_the_next_commit() {
        let mut detector = detector(LatchPolicy::External);
        let capture = detector.latch().clone();

        assert!(detector.observe(Some(0.10)).notify);
        assert!(detector.observe(Some(0.45)).suppressed);
        assert!(detector.observe(Some(0.10)).suppressed);
        capture.rearm();

        let frozen = detector.observe(None);
        assert!(!frozen.step.committed);
        assert_eq!(frozen.step.state, StallState::Occupied);
        assert!(!frozen.notify);
        assert!(!frozen.suppressed);
        assert!(detector.is_transition_pending());
        assert!(capture.is_armed());

        let committed = detector.observe(Some(0.10));
        assert!(committed.notify);
        assert_eq!(committed.payload.state, StallState::Occupied.code());
    }

    #[test]
    fn auto_latch_notifies_once_per_transition() {
        let mut detector = detector(LatchPolicy::Auto);
        let reports = run(
            &mut detector,
            &[Some(0.10), Some(0.10), Some(0.10), Some(0.45), Some(0.45)],
        );

        let notified: Vec<bool> = reports.iter().map(|r| r.notify).collect();
        assert_eq!(notified, vec![true, false, false, true, false]);
        assert!(detector.latch().is_armed());
    }

    #[test]
    fn never_announces_the_same_state_twice_in_a_row() {
        for policy in [LatchPolicy::Auto, LatchPolicy::External] {
            let mut detector = detector(policy);
            let capture = detector.latch().clone();
            let mut seed: u32 = 0x2545_f491;
            let mut announced: Vec<StallState> = Vec::new();
            let mut visited_since_announce: Vec<StallState> = Vec::new();

            for tick in 0..5_000 {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let bucket = (seed >> 16) % 100;
                let reading = match bucket {
                    0..=4 => None,
                    5..=9 => Some(1.5),
                    _ => Some(bucket as f32 / 140.0),
                };

                if policy == LatchPolicy::External && tick % 7 == 0 {
                    capture.rearm();
                }

                let report = detector.observe(reading);
                visited_since_announce.push(report.step.state);
                if report.notify {
                    let state = report.step.state;
                    if let Some(last) = announced.last() {
                        if *last == state {
                            assert!(
                                visited_since_announce.iter().any(|s| *s != state),
                                "repeated {state:?} without an intervening state"
                            );
                        }
                    }
                    announced.push(state);
                    visited_since_announce.clear();
                }
            }

            assert!(!announced.is_empty());
        }
    }

    #[test]
    fn config_update_keeps_state() {
        let mut detector = detector(LatchPolicy::Auto);
        detector.observe(Some(0.10));

        let wider = ClassifierConfig {
            occupied_range: 0.20,
            ..ClassifierConfig::default()
        };
        detector.set_config(wider).unwrap();

        assert_eq!(detector.classifier().state(), StallState::Occupied);
        assert_eq!(detector.classifier().config().occupied_range, 0.20);

        let broken = ClassifierConfig {
            max_range: 0.05,
            ..ClassifierConfig::default()
        };
        assert!(detector.set_config(broken).is_err());
        assert_eq!(detector.classifier().config().occupied_range, 0.20);
    }
}
