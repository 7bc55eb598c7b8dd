//! The admission controller and its sampler loop.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use covenant_core::{EventBus, GovernanceEvent};

use crate::probe::ResourceProbe;
use crate::sample::{ResourceSample, SampleWindow};

/// Static admission thresholds. A sample at or above either value refuses
/// new work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub max_cpu_percent: f64,
    pub max_memory_mb: f64,
}

/// The controller's two states. Derived from the latest sample only;
/// there is no persistent "tripped" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionState {
    Normal,
    Throttled,
}

/// Snapshot returned by the `admissionCheck` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionStatus {
    pub available: bool,
    pub state: AdmissionState,
    pub thresholds: Thresholds,
    pub latest: Option<ResourceSample>,
    pub window_average: Option<ResourceSample>,
}

/// Samples process resources, keeps the rolling history, and answers the
/// only question the request boundary asks: is there room for new work?
pub struct AdmissionController {
    thresholds: Thresholds,
    history: RwLock<SampleWindow>,
    state: RwLock<AdmissionState>,
    events: Arc<EventBus>,
}

impl AdmissionController {
    pub fn new(thresholds: Thresholds, window_capacity: usize, events: Arc<EventBus>) -> Self {
        Self {
            thresholds,
            history: RwLock::new(SampleWindow::new(window_capacity)),
            state: RwLock::new(AdmissionState::Normal),
            events,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Append a sample, recompute the state, and emit an alert on the
    /// Normal→Throttled transition. Recovery is logged but not alerted, so
    /// one sustained spike produces one alert, not one per sample.
    pub fn record_sample(&self, sample: ResourceSample) {
        let over_budget = self.exceeds(&sample);

        self.history.write().unwrap().push(sample);

        let mut state = self.state.write().unwrap();
        match (*state, over_budget) {
            (AdmissionState::Normal, true) => {
                *state = AdmissionState::Throttled;
                warn!(
                    cpu = sample.cpu_percent,
                    memory_mb = sample.memory_mb,
                    max_cpu = self.thresholds.max_cpu_percent,
                    max_memory_mb = self.thresholds.max_memory_mb,
                    "Resource threshold exceeded — refusing new admissions"
                );
                self.events.publish(GovernanceEvent::ResourceAlert {
                    cpu_percent: sample.cpu_percent,
                    memory_mb: sample.memory_mb,
                    timestamp: Utc::now(),
                });
            }
            (AdmissionState::Throttled, false) => {
                *state = AdmissionState::Normal;
                info!(
                    cpu = sample.cpu_percent,
                    memory_mb = sample.memory_mb,
                    "Resource usage back under thresholds — admissions resumed"
                );
            }
            _ => {
                debug!(
                    cpu = sample.cpu_percent,
                    memory_mb = sample.memory_mb,
                    "Resource sample recorded"
                );
            }
        }
    }

    /// True iff the most recent sample's CPU and memory are each below
    /// their thresholds. Evaluated fresh on every call; an empty history
    /// admits (no evidence of pressure yet).
    pub fn has_available_resources(&self) -> bool {
        let history = self.history.read().unwrap();
        match history.latest() {
            Some(sample) => !self.exceeds(sample),
            None => true,
        }
    }

    /// Mean usage over the rolling window, for reporting.
    pub fn window_average(&self) -> Option<ResourceSample> {
        self.history.read().unwrap().average()
    }

    /// Full status for the `admissionCheck` operation.
    pub fn status(&self) -> AdmissionStatus {
        let history = self.history.read().unwrap();
        let latest = history.latest().copied();
        let window_average = history.average();
        drop(history);

        AdmissionStatus {
            available: latest.map(|s| !self.exceeds(&s)).unwrap_or(true),
            state: *self.state.read().unwrap(),
            thresholds: self.thresholds,
            latest,
            window_average,
        }
    }

    fn exceeds(&self, sample: &ResourceSample) -> bool {
        sample.cpu_percent >= self.thresholds.max_cpu_percent
            || sample.memory_mb >= self.thresholds.max_memory_mb
    }
}

/// Run the probe on a fixed interval, feeding the controller.
///
/// The loop is independent of request traffic; request handling reads
/// whatever sample is currently published and never waits for this task.
/// Probe failures are logged and skipped; the previous sample stays
/// authoritative until a fresh one lands.
pub fn spawn_sampler(
    controller: Arc<AdmissionController>,
    probe: Arc<dyn ResourceProbe>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match probe.sample() {
                Ok(sample) => controller.record_sample(sample),
                Err(e) => warn!(error = %e, "Resource probe failed; keeping previous sample"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> AdmissionController {
        AdmissionController::new(
            Thresholds {
                max_cpu_percent: 27.0,
                max_memory_mb: 512.0,
            },
            4,
            Arc::new(EventBus::default()),
        )
    }

    #[test]
    fn empty_history_admits() {
        let ctrl = controller();
        assert!(ctrl.has_available_resources());
        assert_eq!(ctrl.status().state, AdmissionState::Normal);
    }

    #[test]
    fn spec_scenario_threshold_27_sample_30_then_10() {
        let ctrl = controller();

        ctrl.record_sample(ResourceSample::new(30.0, 100.0));
        assert!(!ctrl.has_available_resources());
        assert_eq!(ctrl.status().state, AdmissionState::Throttled);

        // No lingering throttle state: one healthy sample restores admission.
        ctrl.record_sample(ResourceSample::new(10.0, 100.0));
        assert!(ctrl.has_available_resources());
        assert_eq!(ctrl.status().state, AdmissionState::Normal);
    }

    #[test]
    fn memory_threshold_throttles_alone() {
        let ctrl = controller();
        ctrl.record_sample(ResourceSample::new(5.0, 600.0));
        assert!(!ctrl.has_available_resources());
    }

    #[test]
    fn at_threshold_is_over_budget() {
        let ctrl = controller();
        ctrl.record_sample(ResourceSample::new(27.0, 100.0));
        assert!(!ctrl.has_available_resources());
    }

    #[tokio::test]
    async fn alert_fires_once_per_excursion() {
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let ctrl = AdmissionController::new(
            Thresholds {
                max_cpu_percent: 27.0,
                max_memory_mb: 512.0,
            },
            4,
            events,
        );

        ctrl.record_sample(ResourceSample::new(30.0, 100.0));
        ctrl.record_sample(ResourceSample::new(35.0, 100.0)); // still throttled, no new alert
        ctrl.record_sample(ResourceSample::new(10.0, 100.0)); // recovery
        ctrl.record_sample(ResourceSample::new(40.0, 100.0)); // second excursion

        let mut alerts = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.as_ref(), GovernanceEvent::ResourceAlert { .. }) {
                alerts += 1;
            }
        }
        assert_eq!(alerts, 2);
    }

    #[test]
    fn status_reports_window_average() {
        let ctrl = controller();
        ctrl.record_sample(ResourceSample::new(10.0, 100.0));
        ctrl.record_sample(ResourceSample::new(20.0, 200.0));

        let status = ctrl.status();
        assert!(status.available);
        assert_eq!(status.latest.unwrap().cpu_percent, 20.0);
        assert_eq!(status.window_average.unwrap().cpu_percent, 15.0);
    }

    #[tokio::test]
    async fn sampler_feeds_controller() {
        struct StubProbe;
        impl crate::probe::ResourceProbe for StubProbe {
            fn sample(&self) -> std::io::Result<ResourceSample> {
                Ok(ResourceSample::new(12.0, 34.0))
            }
        }

        let ctrl = Arc::new(controller());
        let handle = spawn_sampler(
            ctrl.clone(),
            Arc::new(StubProbe),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        let latest = ctrl.status().latest.unwrap();
        assert_eq!(latest.cpu_percent, 12.0);
        assert_eq!(latest.memory_mb, 34.0);
    }
}
