//! Cumulative per-channel counters and the rolling state derived from them
//!
//! Totals only ever grow. Rates are computed against a baseline that is
//! advanced exactly once per tick by [`RollingState::advance`], never by the
//! recording calls themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::interval::IntervalBuffer;

/// Smallest elapsed window used for a rate, in seconds
const MIN_WINDOW_SECS: f64 = 0.001;

/// Traffic category tracked independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Request/response traffic (HTTP polling)
    Request,
    /// Push traffic fanned out to subscribers
    Broadcast,
}

/// Byte cost of one broadcast reaching `subscribers` receivers.
///
/// A push with nobody connected still counts once.
#[inline]
pub fn broadcast_cost(bytes: u64, subscribers: usize) -> u64 {
    bytes.saturating_mul(subscribers.max(1) as u64)
}

#[derive(Debug, Default)]
struct ChannelState {
    total_events: u64,
    total_bytes: u64,
    baseline_events: u64,
    baseline_bytes: u64,
    intervals: IntervalBuffer,
    last_event_at: Option<Instant>,
}

impl ChannelState {
    fn record(&mut self, bytes: u64, now: Instant) {
        self.total_events += 1;
        self.total_bytes = self.total_bytes.saturating_add(bytes);
        if let Some(prev) = self.last_event_at {
            if let Some(gap) = now.checked_duration_since(prev) {
                self.intervals.record(gap.as_secs_f64() * 1000.0);
            }
        }
        self.last_event_at = Some(now);
    }

    fn rates(&self, window_secs: f64) -> ChannelRates {
        let events_delta = self.total_events.saturating_sub(self.baseline_events);
        let bytes_delta = self.total_bytes.saturating_sub(self.baseline_bytes);
        ChannelRates {
            events_per_sec: events_delta as f64 / window_secs,
            bytes_per_sec: bytes_delta as f64 / window_secs,
            avg_bytes: if events_delta > 0 {
                bytes_delta as f64 / events_delta as f64
            } else {
                0.0
            },
            jitter_ms: self.intervals.std_dev(),
            total_events: self.total_events,
            total_bytes: self.total_bytes,
        }
    }

    fn advance_baseline(&mut self) {
        self.baseline_events = self.total_events;
        self.baseline_bytes = self.total_bytes;
    }

    fn reset_rolling(&mut self) {
        self.advance_baseline();
        self.intervals.clear();
        self.last_event_at = None;
    }
}

/// Rates of one channel over one tick window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelRates {
    pub events_per_sec: f64,
    pub bytes_per_sec: f64,
    pub avg_bytes: f64,
    pub jitter_ms: f64,
    pub total_events: u64,
    pub total_bytes: u64,
}

/// Consistent reading of both channels taken at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowReading {
    pub window_ms: f64,
    pub request: ChannelRates,
    pub broadcast: ChannelRates,
    pub freshness_ms: f64,
    pub source_ts_ms: Option<i64>,
    pub ingest_ts_ms: Option<i64>,
    pub emit_ts_ms: Option<i64>,
}

/// Process-wide counters plus the baselines reset at each session start.
#[derive(Debug)]
pub struct RollingState {
    request: ChannelState,
    broadcast: ChannelState,
    last_tick_at: Instant,
    last_source_ts: Option<DateTime<Utc>>,
    last_ingest_at: Option<DateTime<Utc>>,
    last_emit_at: Option<DateTime<Utc>>,
}

impl Default for RollingState {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl RollingState {
    pub fn new(now: Instant) -> Self {
        Self {
            request: ChannelState::default(),
            broadcast: ChannelState::default(),
            last_tick_at: now,
            last_source_ts: None,
            last_ingest_at: None,
            last_emit_at: None,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::Request => &mut self.request,
            Channel::Broadcast => &mut self.broadcast,
        }
    }

    /// Count one event of `bytes` on `channel`.
    pub fn record(&mut self, channel: Channel, bytes: u64, now: Instant, wall: DateTime<Utc>) {
        self.channel_mut(channel).record(bytes, now);
        self.last_ingest_at = Some(wall);
    }

    /// Move the freshness baseline to an externally observed timestamp.
    pub fn set_source_timestamp(&mut self, ts: DateTime<Utc>, wall: DateTime<Utc>) {
        self.last_source_ts = Some(ts);
        self.last_ingest_at = Some(wall);
    }

    /// Remember when a snapshot was last pushed to subscribers.
    pub fn mark_emitted(&mut self, wall: DateTime<Utc>) {
        self.last_emit_at = Some(wall);
    }

    pub fn totals(&self, channel: Channel) -> (u64, u64) {
        let state = match channel {
            Channel::Request => &self.request,
            Channel::Broadcast => &self.broadcast,
        };
        (state.total_events, state.total_bytes)
    }

    /// Compute rates for the window since the previous call, then advance
    /// every baseline to the current totals.
    pub fn advance(&mut self, now: Instant, wall: DateTime<Utc>) -> WindowReading {
        let reading = self.read(now, wall);
        self.request.advance_baseline();
        self.broadcast.advance_baseline();
        self.last_tick_at = now;
        reading
    }

    /// Same reading as [`advance`](Self::advance) without moving baselines.
    pub fn read(&self, now: Instant, wall: DateTime<Utc>) -> WindowReading {
        let window_secs = now
            .checked_duration_since(self.last_tick_at)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
            .max(MIN_WINDOW_SECS);

        WindowReading {
            window_ms: window_secs * 1000.0,
            request: self.request.rates(window_secs),
            broadcast: self.broadcast.rates(window_secs),
            freshness_ms: self.freshness_ms(wall),
            source_ts_ms: self.last_source_ts.map(|t| t.timestamp_millis()),
            ingest_ts_ms: self.last_ingest_at.map(|t| t.timestamp_millis()),
            emit_ts_ms: self.last_emit_at.map(|t| t.timestamp_millis()),
        }
    }

    /// Milliseconds since the last external-source timestamp; 0 when unknown.
    pub fn freshness_ms(&self, wall: DateTime<Utc>) -> f64 {
        match self.last_source_ts {
            Some(ts) => (wall - ts).num_milliseconds().max(0) as f64,
            None => 0.0,
        }
    }

    /// Drop everything that would leak statistics into a new session.
    ///
    /// Totals survive; baselines jump to them so the next tick starts clean.
    pub fn reset(&mut self, now: Instant) {
        self.request.reset_rolling();
        self.broadcast.reset_rolling();
        self.last_tick_at = now;
        self.last_source_ts = None;
        self.last_ingest_at = None;
        self.last_emit_at = None;
    }
}
