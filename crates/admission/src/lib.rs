//! Resource admission control — refuse new work when the host process
//! exceeds its CPU/memory envelope.
//!
//! A probe samples process CPU and memory on a fixed interval; samples land
//! in a bounded ring (oldest evicted). Admission consults the most recent
//! sample fresh on every request — deliberately conservative: better to
//! occasionally over-throttle than under-throttle near the hardware limit.
//!
//! The controller has exactly two states, `Normal ⇄ Throttled`, derived
//! from the latest sample. There is no latched trip: one healthy sample
//! restores admission. Crossing a threshold emits an alert event; nothing
//! here terminates the process or cancels in-flight operations — only new
//! admissions are refused.

mod controller;
mod probe;
mod sample;

pub use controller::{AdmissionController, AdmissionState, AdmissionStatus, Thresholds, spawn_sampler};
pub use probe::{ProcProbe, ResourceProbe};
pub use sample::{ResourceSample, SampleWindow};
