//! Measurement sessions
//!
//! A session is a labelled window of snapshots taken under one delivery
//! mode, optionally with synthetic traffic and background load attached.
//! Configuration is validated and normalised once, at start; the record is
//! append-only while active and frozen once finished.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::counters::Channel;
use crate::error::{MonitorError, Result};
use crate::snapshot::Snapshot;

/// Lowest accepted poll period in poll mode
pub const MIN_POLLING_INTERVAL_MS: u64 = 100;
/// Poll period when none is configured
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 1000;
/// Longest accepted duration, warmup or cooldown: one year
pub const MAX_SESSION_SECS: f64 = 365.0 * 24.0 * 3600.0;

// ============================================================================
// Mode
// ============================================================================

/// Delivery mode under measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelMode {
    /// Server pushes to connected subscribers
    #[serde(rename = "ws", alias = "push")]
    Push,
    /// Clients poll a request/response endpoint
    #[serde(rename = "polling", alias = "poll")]
    Poll,
}

impl ChannelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelMode::Push => "ws",
            ChannelMode::Poll => "polling",
        }
    }

    /// Counter channel that carries this mode's traffic
    pub fn channel(&self) -> Channel {
        match self {
            ChannelMode::Push => Channel::Broadcast,
            ChannelMode::Poll => Channel::Request,
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelMode {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ws" | "push" => Ok(ChannelMode::Push),
            "polling" | "poll" => Ok(ChannelMode::Poll),
            other => Err(MonitorError::Validation(format!("unknown mode: {}", other))),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

fn default_true() -> bool {
    true
}

/// Session configuration. Every knob except `label` and `mode` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub label: String,
    pub mode: ChannelMode,
    /// Poll period; poll mode only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_ms: Option<u64>,
    /// Finish after this many snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<usize>,
    /// Finish after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warmup_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_sec: Option<f64>,
    /// Push mode: run the fixed-rate push driver at this rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_fixed_rate_hz: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumed_payload_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_cpu_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients_http: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients_ws: Option<usize>,
    /// Poll mode: use the real network poller rather than the synthetic one
    #[serde(default = "default_true")]
    pub internal_http_driver: bool,
}

impl SessionConfig {
    pub fn new(label: impl Into<String>, mode: ChannelMode) -> Self {
        Self {
            label: label.into(),
            mode,
            polling_interval_ms: None,
            sample_count: None,
            duration_sec: None,
            warmup_sec: None,
            cooldown_sec: None,
            ws_fixed_rate_hz: None,
            assumed_payload_bytes: None,
            load_cpu_pct: None,
            load_workers: None,
            clients_http: None,
            clients_ws: None,
            internal_http_driver: true,
        }
    }

    pub fn push(label: impl Into<String>) -> Self {
        Self::new(label, ChannelMode::Push)
    }

    pub fn poll(label: impl Into<String>) -> Self {
        Self::new(label, ChannelMode::Poll)
    }

    pub fn with_rate_hz(mut self, hz: f64) -> Self {
        self.ws_fixed_rate_hz = Some(hz);
        self
    }

    pub fn with_payload_bytes(mut self, bytes: u64) -> Self {
        self.assumed_payload_bytes = Some(bytes);
        self
    }

    pub fn with_polling_interval_ms(mut self, ms: u64) -> Self {
        self.polling_interval_ms = Some(ms);
        self
    }

    pub fn with_sample_count(mut self, n: usize) -> Self {
        self.sample_count = Some(n);
        self
    }

    pub fn with_duration_sec(mut self, secs: f64) -> Self {
        self.duration_sec = Some(secs);
        self
    }

    pub fn with_trim(mut self, warmup_sec: f64, cooldown_sec: f64) -> Self {
        self.warmup_sec = Some(warmup_sec);
        self.cooldown_sec = Some(cooldown_sec);
        self
    }

    pub fn with_load(mut self, cpu_pct: f64, workers: usize) -> Self {
        self.load_cpu_pct = Some(cpu_pct);
        self.load_workers = Some(workers);
        self
    }

    pub fn with_clients_http(mut self, n: usize) -> Self {
        self.clients_http = Some(n);
        self
    }

    pub fn with_clients_ws(mut self, n: usize) -> Self {
        self.clients_ws = Some(n);
        self
    }

    pub fn with_internal_http_driver(mut self, enabled: bool) -> Self {
        self.internal_http_driver = enabled;
        self
    }

    /// Validate and fill in defaults.
    ///
    /// Zero limits mean "no limit" and are dropped. In poll mode the poll
    /// period becomes `max(100, value or 1000)`.
    pub fn normalize(mut self) -> Result<Self> {
        if self.label.trim().is_empty() {
            return Err(MonitorError::Validation("label must not be empty".into()));
        }
        for (name, value) in [
            ("durationSec", self.duration_sec),
            ("warmupSec", self.warmup_sec),
            ("cooldownSec", self.cooldown_sec),
            ("wsFixedRateHz", self.ws_fixed_rate_hz),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(MonitorError::Validation(format!("{} must be a finite number >= 0, got {}", name, v)));
                }
                if name != "wsFixedRateHz" && v > MAX_SESSION_SECS {
                    return Err(MonitorError::Validation(format!(
                        "{} must be at most {} seconds, got {}",
                        name, MAX_SESSION_SECS, v
                    )));
                }
            }
        }
        if let Some(pct) = self.load_cpu_pct {
            if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
                return Err(MonitorError::Validation(format!("loadCpuPct must be within 0..=100, got {}", pct)));
            }
        }

        self.sample_count = self.sample_count.filter(|n| *n > 0);
        self.duration_sec = self.duration_sec.filter(|s| *s > 0.0);
        self.ws_fixed_rate_hz = self.ws_fixed_rate_hz.filter(|hz| *hz > 0.0);
        self.assumed_payload_bytes = self.assumed_payload_bytes.filter(|b| *b > 0);
        self.load_cpu_pct = self.load_cpu_pct.filter(|p| *p > 0.0);
        if self.mode == ChannelMode::Poll {
            let ms = self.polling_interval_ms.unwrap_or(DEFAULT_POLLING_INTERVAL_MS);
            self.polling_interval_ms = Some(ms.max(MIN_POLLING_INTERVAL_MS));
        }
        Ok(self)
    }

    /// Fixed push rate, if one is configured
    pub fn rate_hz(&self) -> Option<f64> {
        self.ws_fixed_rate_hz.filter(|hz| *hz > 0.0)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_sec
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms.unwrap_or(DEFAULT_POLLING_INTERVAL_MS))
    }

    pub fn warmup(&self) -> Duration {
        secs(self.warmup_sec)
    }

    pub fn cooldown(&self) -> Duration {
        secs(self.cooldown_sec)
    }
}

fn secs(v: Option<f64>) -> Duration {
    match v {
        Some(s) if s > 0.0 => Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}

// ============================================================================
// Record
// ============================================================================

/// Environment facts captured when a session starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub crate_version: String,
    pub sensor_interval_ms: u64,
    pub tick_interval_ms: u64,
}

/// One measurement session and its snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub config: SessionConfig,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub samples: Vec<Snapshot>,
    pub meta: SessionMeta,
}

impl SessionRecord {
    pub(crate) fn new(id: String, config: SessionConfig, meta: SessionMeta) -> Self {
        Self {
            id,
            config,
            started_at: Utc::now(),
            finished_at: None,
            samples: Vec::new(),
            meta,
        }
    }

    pub fn is_active(&self) -> bool {
        self.finished_at.is_none()
    }

    pub fn mode(&self) -> ChannelMode {
        self.config.mode
    }

    pub fn started_at_iso(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn finished_at_iso(&self) -> Option<String> {
        self.finished_at.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Whether a configured sample-count or duration limit has been reached
    pub(crate) fn limit_reached(&self, now: DateTime<Utc>) -> bool {
        if let Some(n) = self.config.sample_count {
            if self.samples.len() >= n {
                return true;
            }
        }
        match (self.config.duration(), (now - self.started_at).to_std()) {
            (Some(limit), Ok(elapsed)) => elapsed >= limit,
            _ => false,
        }
    }

    /// Analysis window `[start + warmup, max(start + warmup, end - cooldown)]`.
    ///
    /// `end` is the finish time, or the start time for an unfinished session.
    pub fn trim_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let warmup = chrono::Duration::from_std(self.config.warmup()).unwrap_or_else(|_| chrono::Duration::zero());
        let cooldown = chrono::Duration::from_std(self.config.cooldown()).unwrap_or_else(|_| chrono::Duration::zero());
        let start = self.started_at.checked_add_signed(warmup).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let end = self
            .finished_at
            .unwrap_or(self.started_at)
            .checked_sub_signed(cooldown)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        (start, end.max(start))
    }

    /// Snapshots inside the warmup/cooldown trimmed window
    pub fn trimmed_samples(&self) -> Vec<&Snapshot> {
        let (start, end) = self.trim_window();
        self.samples
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .collect()
    }
}
