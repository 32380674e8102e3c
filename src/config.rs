//! Monitor configuration
//!
//! Values are read once when the monitor is constructed; nothing here is
//! reloaded while the sampling loop runs.

use serde::Deserialize;

/// Lowest accepted tick interval in milliseconds
pub const MIN_TICK_INTERVAL_MS: u64 = 200;
/// Tick interval used when none (or an invalid one) is configured
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
/// Minimum spacing between two real OS process samples
pub const DEFAULT_CPU_SAMPLE_INTERVAL_MS: u64 = 1000;
/// Endpoint hit by the real network poller
pub const DEFAULT_SELF_POLL_URL: &str = "http://localhost:5000/api/arduino-data";

/// Runtime configuration of a [`ResourceMonitor`](crate::ResourceMonitor).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Sampling loop period. Floored to [`MIN_TICK_INTERVAL_MS`].
    pub tick_interval_ms: u64,
    /// Throttle for the expensive process sampler.
    pub cpu_sample_interval_ms: u64,
    /// Skip the OS process sampler entirely and use the fallback reader.
    pub process_sampling_disabled: bool,
    /// Initial value of the live-emission gate.
    pub live_emit_enabled: bool,
    /// Target of the real network poller.
    pub self_poll_url: String,
    /// Upstream sensor period, recorded in session metadata.
    pub sensor_interval_ms: u64,
    /// Period of the scheduler-delay probe.
    pub delay_resolution_ms: u64,
    /// Payload size used by the push driver when nothing better is known.
    pub default_payload_bytes: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            cpu_sample_interval_ms: DEFAULT_CPU_SAMPLE_INTERVAL_MS,
            process_sampling_disabled: false,
            live_emit_enabled: true,
            self_poll_url: DEFAULT_SELF_POLL_URL.to_string(),
            sensor_interval_ms: 500,
            delay_resolution_ms: 20,
            default_payload_bytes: 400,
        }
    }
}

impl MonitorConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let tick_interval_ms = lookup("MONITOR_TICK_MS")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| lookup("LIVE_MONITOR_TICK_MS"))
            .map(|v| parse_tick_interval(&v))
            .unwrap_or(defaults.tick_interval_ms);

        let cpu_sample_interval_ms = lookup("MONITOR_CPU_SAMPLE_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(defaults.cpu_sample_interval_ms);

        let process_sampling_disabled = lookup("MONITOR_DISABLE_PIDUSAGE")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        let live_emit_enabled = lookup("LIVE_REALTIME_ENABLED")
            .or_else(|| lookup("LIVE_EMIT_ENABLED"))
            .map(|v| !is_falsy(&v))
            .unwrap_or(defaults.live_emit_enabled);

        let self_poll_url = lookup("SELF_POLL_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.self_poll_url);

        let sensor_interval_ms = lookup("SENSOR_SAMPLE_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(defaults.sensor_interval_ms);

        Self {
            tick_interval_ms,
            cpu_sample_interval_ms,
            process_sampling_disabled,
            live_emit_enabled,
            self_poll_url,
            sensor_interval_ms,
            ..defaults
        }
    }

    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    pub fn with_cpu_sample_interval_ms(mut self, ms: u64) -> Self {
        self.cpu_sample_interval_ms = ms;
        self
    }

    pub fn with_process_sampling_disabled(mut self, disabled: bool) -> Self {
        self.process_sampling_disabled = disabled;
        self
    }

    pub fn with_live_emit_enabled(mut self, enabled: bool) -> Self {
        self.live_emit_enabled = enabled;
        self
    }

    pub fn with_self_poll_url(mut self, url: impl Into<String>) -> Self {
        self.self_poll_url = url.into();
        self
    }

    /// Tick interval after applying the floor.
    pub fn effective_tick_interval_ms(&self) -> u64 {
        if self.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            DEFAULT_TICK_INTERVAL_MS
        } else {
            self.tick_interval_ms
        }
    }
}

fn parse_tick_interval(raw: &str) -> u64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= MIN_TICK_INTERVAL_MS as f64 => v as u64,
        _ => DEFAULT_TICK_INTERVAL_MS,
    }
}

fn is_falsy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no")
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes")
}
