//! Resource probes — where samples come from.
//!
//! On Linux the probe reads `/proc/self/stat` (CPU ticks) and
//! `/proc/self/statm` (resident pages). On other targets it reports zero
//! usage, so admission never throttles where it cannot measure; supply a
//! platform probe through the trait if that matters for your deployment.

use std::io;
use std::sync::Mutex;
use std::time::Instant;

use crate::sample::ResourceSample;

/// Source of resource samples. Implementations must not block beyond a
/// quick file read; the sampler loop calls this on its fixed interval.
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> io::Result<ResourceSample>;
}

/// Kernel tick rate. USER_HZ has been 100 on every mainstream Linux
/// configuration for decades; the value is fixed at build time here rather
/// than pulling in a libc dependency for one sysconf call.
#[cfg(target_os = "linux")]
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

#[cfg(target_os = "linux")]
const PAGE_SIZE_BYTES: f64 = 4096.0;

/// CPU accounting needs two readings; the previous one lives here.
#[derive(Debug, Clone, Copy)]
struct CpuBaseline {
    read_at: Instant,
    total_ticks: u64,
}

/// `/proc`-based probe for the current process.
///
/// CPU percent is the utime+stime delta between consecutive samples over
/// the wall-clock elapsed; the first sample reports 0% (no baseline yet).
pub struct ProcProbe {
    baseline: Mutex<Option<CpuBaseline>>,
}

impl ProcProbe {
    pub fn new() -> Self {
        Self {
            baseline: Mutex::new(None),
        }
    }
}

impl Default for ProcProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl ResourceProbe for ProcProbe {
    fn sample(&self) -> io::Result<ResourceSample> {
        let stat = std::fs::read_to_string("/proc/self/stat")?;
        let statm = std::fs::read_to_string("/proc/self/statm")?;

        let total_ticks = parse_cpu_ticks(&stat)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed /proc/self/stat"))?;
        let resident_pages = parse_resident_pages(&statm)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed /proc/self/statm"))?;

        let now = Instant::now();
        let mut baseline = self.baseline.lock().unwrap();
        let cpu_percent = match *baseline {
            Some(prev) => {
                let elapsed = now.duration_since(prev.read_at).as_secs_f64();
                if elapsed > 0.0 {
                    let used_secs =
                        total_ticks.saturating_sub(prev.total_ticks) as f64 / CLOCK_TICKS_PER_SEC;
                    (used_secs / elapsed * 100.0).clamp(0.0, 100.0)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        *baseline = Some(CpuBaseline {
            read_at: now,
            total_ticks,
        });

        let memory_mb = resident_pages as f64 * PAGE_SIZE_BYTES / (1024.0 * 1024.0);
        Ok(ResourceSample::new(cpu_percent, memory_mb))
    }
}

#[cfg(not(target_os = "linux"))]
impl ResourceProbe for ProcProbe {
    fn sample(&self) -> io::Result<ResourceSample> {
        // No portable process accounting without a platform probe.
        Ok(ResourceSample::new(0.0, 0.0))
    }
}

/// utime + stime from `/proc/self/stat`.
///
/// The comm field (2nd) may contain spaces, so fields are counted from the
/// closing paren: utime and stime are the 12th and 13th fields after it.
#[cfg(target_os = "linux")]
fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

/// Resident set size in pages: second field of `/proc/self/statm`.
#[cfg(target_os = "linux")]
fn parse_resident_pages(statm: &str) -> Option<u64> {
    statm.split_whitespace().nth(1)?.parse().ok()
}
