//! Resource samples and the bounded rolling history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A point-in-time reading of process resource usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

impl ResourceSample {
    pub fn new(cpu_percent: f64, memory_mb: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            cpu_percent,
            memory_mb,
        }
    }
}

/// Fixed-capacity ring of samples; pushing beyond capacity evicts the
/// oldest. Backs the short-window averages used for reporting.
#[derive(Debug)]
pub struct SampleWindow {
    samples: VecDeque<ResourceSample>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sample window capacity must be at least 1");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: ResourceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// The most recently pushed sample.
    pub fn latest(&self) -> Option<&ResourceSample> {
        self.samples.back()
    }

    /// Mean CPU and memory over the window. Timestamp is the latest
    /// sample's.
    pub fn average(&self) -> Option<ResourceSample> {
        let latest = self.samples.back()?;
        let n = self.samples.len() as f64;
        Some(ResourceSample {
            timestamp: latest.timestamp,
            cpu_percent: self.samples.iter().map(|s| s.cpu_percent).sum::<f64>() / n,
            memory_mb: self.samples.iter().map(|s| s.memory_mb).sum::<f64>() / n,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
