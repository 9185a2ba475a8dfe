use std::{
    sync::{Arc, Mutex as StdMutex, OnceLock, PoisonError},
    time::Duration,
};

use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info};

use parking_meter_common::{
    config::OccupancyPolicy, display::stall_led, BeaconSource, ClassifierConfig, ConfigError,
    NotificationLatch, OccupancyDetector, OccupancyPayload, RangeSampler, TickReport,
};

use crate::{
    beacon::BeaconHandle,
    notifier::{Notification, Notifier},
    panel::{DisplaySink, PanelUpdate},
};

/// Latest distance reading pushed by the range finder.
///
/// Reads older than the stale timeout count as a sensor fault.
#[derive(Clone)]
pub struct RangeFeed {
    latest: Arc<StdMutex<Option<(f32, Instant)>>>,
    stale_after: Duration,
}

impl RangeFeed {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            latest: Arc::new(StdMutex::new(None)),
            stale_after,
        }
    }

    pub fn record(&self, meters: f32) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some((meters, Instant::now()));
    }

    pub fn latest(&self) -> Option<f32> {
        let latest = *self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest
            .filter(|(_, at)| at.elapsed() <= self.stale_after)
            .map(|(meters, _)| meters)
    }

    pub fn detected_within(&self, trigger_m: f32) -> bool {
        self.latest()
            .is_some_and(|meters| meters.is_finite() && (0.0..=trigger_m).contains(&meters))
    }
}

impl RangeSampler for RangeFeed {
    fn read_m(&mut self) -> Option<f32> {
        self.latest()
    }
}

#[derive(Clone)]
pub struct OccupancyService {
    detector: Arc<Mutex<OccupancyDetector>>,
    latch: NotificationLatch,
    feed: RangeFeed,
    started: Arc<OnceLock<()>>,
    beacon: BeaconHandle,
    notifier: Notifier,
    panel: Arc<dyn DisplaySink>,
}

impl OccupancyService {
    pub fn new(
        config: ClassifierConfig,
        policy: &OccupancyPolicy,
        beacon: BeaconHandle,
        notifier: Notifier,
        panel: Arc<dyn DisplaySink>,
    ) -> Self {
        let latch = NotificationLatch::new();
        let detector = OccupancyDetector::new(config, latch.clone(), policy.latch);
        Self {
            detector: Arc::new(Mutex::new(detector)),
            latch,
            feed: RangeFeed::new(Duration::from_millis(policy.sensor_stale_timeout_ms)),
            started: Arc::new(OnceLock::new()),
            beacon,
            notifier,
            panel,
        }
    }

    /// Spawns the sampling task on first use. Returns `true` on the call that spawned it.
    pub fn ensure_started(&self) -> bool {
        let mut spawned = false;
        self.started.get_or_init(|| {
            tokio::spawn(self.clone().run());
            spawned = true;
        });
        spawned
    }

    pub fn record_range(&self, meters: f32) {
        self.feed.record(meters);
    }

    pub fn object_detected(&self, trigger_m: f32) -> bool {
        self.feed.detected_within(trigger_m)
    }

    pub fn rearm(&self) -> bool {
        let reopened = self.latch.rearm();
        if reopened {
            info!("occupancy notification latch rearmed");
        }
        reopened
    }

    pub async fn payload(&self) -> OccupancyPayload {
        self.detector.lock().await.payload()
    }

    pub async fn config(&self) -> ClassifierConfig {
        *self.detector.lock().await.classifier().config()
    }

    pub async fn set_config(&self, config: ClassifierConfig) -> Result<(), ConfigError> {
        self.detector.lock().await.set_config(config)
    }

    async fn run(self) {
        let startup_delay = self.config().await.startup_delay_ms;
        info!("occupancy sampling starts in {startup_delay}ms");
        tokio::time::sleep(Duration::from_millis(startup_delay)).await;

        let mut feed = self.feed.clone();
        let mut beacon_level = None;
        loop {
            let report = {
                let mut detector = self.detector.lock().await;
                detector.sample_tick(&mut feed)
            };
            let interval_ms = report.step.interval_ms;
            self.dispatch(report, &mut beacon_level).await;
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }

    // Commits repeat every tick, so the beacon only hears about level changes.
    async fn dispatch(&self, report: TickReport, beacon_level: &mut Option<bool>) {
        let step = &report.step;

        if step.state != step.previous {
            debug!(
                "stall {} -> {} ({:?})",
                step.previous.as_str(),
                step.state.as_str(),
                step.distance
            );
            self.panel.show(PanelUpdate::Led {
                color: stall_led(step.state),
                on: true,
            });
        }

        if step.transition {
            info!(
                "stall committed {} (count {})",
                step.state.as_str(),
                report.payload.count
            );
        }

        if let Some(on) = step.beacon {
            if *beacon_level != Some(on) {
                *beacon_level = Some(on);
                self.beacon.request(BeaconSource::Occupancy, on).await;
            }
        }

        if report.notify {
            self.notifier.send(Notification::Occupancy(report.payload));
        } else if report.suppressed {
            debug!("occupancy notification held until capture completes");
        }
    }
}
