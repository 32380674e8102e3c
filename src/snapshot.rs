//! Metrics snapshot produced once per tick
//!
//! Field names on the wire follow the dashboard protocol (`wsMsgRate`,
//! `httpReqRate`, ...): "ws" is the broadcast channel, "http" the request
//! channel.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::counters::{Channel, WindowReading};
use crate::sampler::{MemoryReading, ProcessUsage};
use crate::scheduler::SchedulerHealth;

/// Event name under which snapshots are published
pub const METRICS_EVENT: &str = "metrics";

const MB: f64 = 1024.0 * 1024.0;

/// One immutable metrics reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "cpu")]
    pub cpu_percent: f64,
    #[serde(rename = "rssMB")]
    pub rss_mb: f64,
    #[serde(rename = "heapUsedMB")]
    pub heap_used_mb: f64,
    #[serde(rename = "heapTotalMB")]
    pub heap_total_mb: f64,
    #[serde(rename = "externalMB")]
    pub external_mb: f64,

    #[serde(rename = "elu")]
    pub utilization: f64,
    #[serde(rename = "elDelayP50Ms")]
    pub delay_p50_ms: f64,
    #[serde(rename = "elDelayP99Ms")]
    pub delay_p99_ms: f64,
    #[serde(rename = "elDelayMaxMs")]
    pub delay_max_ms: f64,

    #[serde(rename = "wsClients")]
    pub subscribers: usize,
    #[serde(rename = "httpReqRate")]
    pub request_rate: f64,
    #[serde(rename = "wsMsgRate")]
    pub broadcast_rate: f64,
    #[serde(rename = "httpBytesRate")]
    pub request_bytes_rate: f64,
    #[serde(rename = "wsBytesRate")]
    pub broadcast_bytes_rate: f64,
    #[serde(rename = "httpAvgBytesPerReq")]
    pub request_avg_bytes: f64,
    #[serde(rename = "wsAvgBytesPerMsg")]
    pub broadcast_avg_bytes: f64,
    #[serde(rename = "httpJitterMs")]
    pub request_jitter_ms: f64,
    #[serde(rename = "wsJitterMs")]
    pub broadcast_jitter_ms: f64,

    #[serde(rename = "tickMs")]
    pub tick_ms: f64,
    #[serde(rename = "dataFreshnessMs")]
    pub freshness_ms: f64,
    #[serde(rename = "sourceTsMs")]
    pub source_ts_ms: Option<i64>,
    #[serde(rename = "ingestTsMs")]
    pub ingest_ts_ms: Option<i64>,
    #[serde(rename = "emitTsMs")]
    pub emit_ts_ms: Option<i64>,

    #[serde(rename = "totalHttpRequests")]
    pub total_requests: u64,
    #[serde(rename = "totalWsMessages")]
    pub total_broadcasts: u64,
    #[serde(rename = "totalHttpBytes")]
    pub total_request_bytes: u64,
    #[serde(rename = "totalWsBytes")]
    pub total_broadcast_bytes: u64,

    #[serde(rename = "loadAvg1")]
    pub load_avg_1: f64,
    #[serde(rename = "uptimeSec")]
    pub uptime_sec: f64,
}

/// Raw inputs gathered by one tick
#[derive(Debug, Clone, Copy)]
pub(crate) struct SnapshotInputs {
    pub timestamp: DateTime<Utc>,
    pub usage: ProcessUsage,
    pub memory: MemoryReading,
    pub scheduler: SchedulerHealth,
    pub subscribers: usize,
    pub window: WindowReading,
    pub load_avg_1: f64,
    pub uptime_sec: f64,
}

impl Snapshot {
    pub(crate) fn assemble(inputs: SnapshotInputs) -> Self {
        let SnapshotInputs {
            timestamp,
            usage,
            memory,
            scheduler,
            subscribers,
            window,
            load_avg_1,
            uptime_sec,
        } = inputs;
        let request = window.request;
        let broadcast = window.broadcast;
        let resident = if usage.resident_bytes > 0 {
            usage.resident_bytes
        } else {
            memory.resident_bytes
        };

        Self {
            timestamp,
            cpu_percent: finite(usage.cpu_percent),
            rss_mb: resident as f64 / MB,
            heap_used_mb: memory.heap_used_bytes as f64 / MB,
            heap_total_mb: memory.heap_total_bytes as f64 / MB,
            external_mb: memory.external_bytes as f64 / MB,
            utilization: finite(scheduler.utilization).min(1.0),
            delay_p50_ms: finite(scheduler.delay_p50_ms),
            delay_p99_ms: finite(scheduler.delay_p99_ms),
            delay_max_ms: finite(scheduler.delay_max_ms),
            subscribers,
            request_rate: finite(request.events_per_sec),
            broadcast_rate: finite(broadcast.events_per_sec),
            request_bytes_rate: finite(request.bytes_per_sec),
            broadcast_bytes_rate: finite(broadcast.bytes_per_sec),
            request_avg_bytes: finite(request.avg_bytes),
            broadcast_avg_bytes: finite(broadcast.avg_bytes),
            request_jitter_ms: finite(request.jitter_ms),
            broadcast_jitter_ms: finite(broadcast.jitter_ms),
            tick_ms: finite(window.window_ms),
            freshness_ms: finite(window.freshness_ms),
            source_ts_ms: window.source_ts_ms,
            ingest_ts_ms: window.ingest_ts_ms,
            emit_ts_ms: window.emit_ts_ms,
            total_requests: request.total_events,
            total_broadcasts: broadcast.total_events,
            total_request_bytes: request.total_bytes,
            total_broadcast_bytes: broadcast.total_bytes,
            load_avg_1: finite(load_avg_1),
            uptime_sec: finite(uptime_sec),
        }
    }

    /// ISO-8601 timestamp with millisecond precision
    pub fn ts_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Event rate of one channel
    pub fn rate(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Request => self.request_rate,
            Channel::Broadcast => self.broadcast_rate,
        }
    }

    /// Byte rate of one channel
    pub fn bytes_rate(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Request => self.request_bytes_rate,
            Channel::Broadcast => self.broadcast_bytes_rate,
        }
    }

    /// Jitter of one channel
    pub fn jitter_ms(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Request => self.request_jitter_ms,
            Channel::Broadcast => self.broadcast_jitter_ms,
        }
    }
}

/// Clamp a derived figure to a finite, non-negative value.
#[inline]
fn finite(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}
