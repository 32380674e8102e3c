//! Process statistics sampling
//!
//! Wraps an OS-level process probe behind a throttle so the expensive call
//! runs at most once per `cpu_sample_interval_ms`. Any failure, stall or an
//! explicitly disabled probe degrades to a cheap memory reading with CPU
//! reported as 0; nothing here ever returns an error to the tick loop.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::Result;

/// Upper bound on a single real process sample
const SAMPLE_TIMEOUT: Duration = Duration::from_secs(2);

/// CPU and memory figures of the current process
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    /// CPU usage in percent of one core (may exceed 100 on multi-core)
    pub cpu_percent: f64,
    /// Resident set size in bytes
    pub resident_bytes: u64,
}

/// Source of real process statistics
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    /// Take one sample. May be slow; callers throttle it.
    async fn sample(&self) -> Result<ProcessUsage>;

    /// Probe name for logs
    fn probe_name(&self) -> &'static str;
}

// =============================================================================
// LIGHTWEIGHT MEMORY READING
// =============================================================================

/// Memory figures that are always available without a process probe.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryReading {
    pub resident_bytes: u64,
    /// Data segment (heap and stacks)
    pub heap_used_bytes: u64,
    /// Total mapped address space
    pub heap_total_bytes: u64,
    /// Shared, file-backed pages
    pub external_bytes: u64,
}

impl MemoryReading {
    /// Read the current process memory figures, zeros when unsupported.
    pub fn current() -> Self {
        #[cfg(target_os = "linux")]
        {
            if let Ok(raw) = std::fs::read_to_string("/proc/self/statm") {
                if let Some(reading) = Self::parse_statm(&raw, page_size()) {
                    return reading;
                }
            }
        }
        Self::default()
    }

    /// Parse `/proc/<pid>/statm` (sizes in pages).
    pub fn parse_statm(raw: &str, page_size: u64) -> Option<Self> {
        let fields: Vec<u64> = raw
            .split_whitespace()
            .map(|f| f.parse::<u64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if fields.len() < 6 {
            return None;
        }
        Some(Self {
            heap_total_bytes: fields[0] * page_size,
            resident_bytes: fields[1] * page_size,
            external_bytes: fields[2] * page_size,
            heap_used_bytes: fields[5] * page_size,
        })
    }
}

#[cfg(unix)]
fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions and only reads a constant
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}

#[cfg(not(unix))]
#[allow(dead_code)]
fn page_size() -> u64 {
    4096
}

/// One-minute OS load average, 0 where the platform has none.
pub fn load_average_one() -> f64 {
    #[cfg(feature = "process-stats")]
    {
        sysinfo::System::load_average().one
    }
    #[cfg(all(not(feature = "process-stats"), target_os = "linux"))]
    {
        std::fs::read_to_string("/proc/loadavg")
            .ok()
            .and_then(|s| s.split_whitespace().next().and_then(|v| v.parse::<f64>().ok()))
            .unwrap_or(0.0)
    }
    #[cfg(all(not(feature = "process-stats"), not(target_os = "linux")))]
    {
        0.0
    }
}

// =============================================================================
// SYSINFO PROBE
// =============================================================================

/// Real process probe backed by `sysinfo`.
#[cfg(feature = "process-stats")]
#[derive(Debug, Clone)]
pub struct SysinfoProbe {
    system: Arc<Mutex<sysinfo::System>>,
    pid: sysinfo::Pid,
}

#[cfg(feature = "process-stats")]
impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = sysinfo::Pid::from_u32(std::process::id());
        let mut system = sysinfo::System::new();
        // prime CPU accounting so the first real sample has a reference point
        system.refresh_process(pid);
        Self {
            system: Arc::new(Mutex::new(system)),
            pid,
        }
    }
}

#[cfg(feature = "process-stats")]
impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "process-stats")]
#[async_trait]
impl ProcessProbe for SysinfoProbe {
    async fn sample(&self) -> Result<ProcessUsage> {
        use crate::error::MonitorError;

        let system = self.system.clone();
        let pid = self.pid;
        tokio::task::spawn_blocking(move || {
            let mut sys = system.lock().unwrap_or_else(|e| e.into_inner());
            if !sys.refresh_process(pid) {
                return Err(MonitorError::Sampler(format!("process {} not found", pid)));
            }
            let process = sys
                .process(pid)
                .ok_or_else(|| MonitorError::Sampler(format!("process {} vanished", pid)))?;
            Ok(ProcessUsage {
                cpu_percent: f64::from(process.cpu_usage()).max(0.0),
                resident_bytes: process.memory(),
            })
        })
        .await
        .map_err(|e| MonitorError::Sampler(format!("sampling task failed: {}", e)))?
    }

    fn probe_name(&self) -> &'static str {
        "sysinfo"
    }
}

/// Default probe for this build, `None` when process stats are compiled out.
pub fn default_probe() -> Option<Arc<dyn ProcessProbe>> {
    #[cfg(feature = "process-stats")]
    {
        Some(Arc::new(SysinfoProbe::new()))
    }
    #[cfg(not(feature = "process-stats"))]
    {
        None
    }
}

// =============================================================================
// THROTTLED SAMPLER
// =============================================================================

/// Throttled, never-failing process sampler.
pub struct ProcessSampler {
    probe: Option<Arc<dyn ProcessProbe>>,
    min_interval: Duration,
    cache: Mutex<Option<(Instant, ProcessUsage)>>,
}

impl std::fmt::Debug for ProcessSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSampler")
            .field("probe", &self.probe.as_ref().map(|p| p.probe_name()))
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

impl ProcessSampler {
    /// `probe = None` disables real sampling.
    pub fn new(probe: Option<Arc<dyn ProcessProbe>>, min_interval: Duration) -> Self {
        Self {
            probe,
            min_interval,
            cache: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.probe.is_some()
    }

    /// Current usage: cached when fresh enough, real when due, fallback otherwise.
    pub async fn sample(&self) -> ProcessUsage {
        let Some(probe) = &self.probe else {
            return Self::fallback();
        };

        let cached = *self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((at, usage)) = cached {
            if at.elapsed() < self.min_interval {
                return usage;
            }
        }

        match tokio::time::timeout(SAMPLE_TIMEOUT, probe.sample()).await {
            Ok(Ok(usage)) => {
                *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = Some((Instant::now(), usage));
                usage
            }
            Ok(Err(e)) => {
                debug!(probe = probe.probe_name(), error = %e, "process sample failed, using fallback");
                Self::fallback()
            }
            Err(_) => {
                debug!(probe = probe.probe_name(), "process sample timed out, using fallback");
                Self::fallback()
            }
        }
    }

    /// Forget the cached sample so the next call hits the probe.
    pub fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn fallback() -> ProcessUsage {
        ProcessUsage {
            cpu_percent: 0.0,
            resident_bytes: MemoryReading::current().resident_bytes,
        }
    }
}
