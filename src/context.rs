//! Shared monitor context
//!
//! Owns the counters, rolling state, emission gate and publisher. The
//! sampling loop reads it; traffic drivers and external ingestion points
//! write it, each write being one short critical section.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::counters::{broadcast_cost, Channel, RollingState, WindowReading};
use crate::gate::LiveEmitGate;
use crate::publisher::Publisher;

/// State shared between the sampling loop and the traffic drivers.
pub struct MonitorContext {
    rolling: Mutex<RollingState>,
    gate: LiveEmitGate,
    publisher: Arc<dyn Publisher>,
    observed_payload_bytes: AtomicU64,
}

impl std::fmt::Debug for MonitorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorContext")
            .field("gate", &self.gate)
            .field("publisher", &self.publisher.publisher_name())
            .field("observed_payload_bytes", &self.observed_payload_bytes)
            .finish()
    }
}

impl MonitorContext {
    pub fn new(publisher: Arc<dyn Publisher>, live_emit_enabled: bool, default_payload_bytes: u64) -> Self {
        Self {
            rolling: Mutex::new(RollingState::new(Instant::now())),
            gate: LiveEmitGate::new(live_emit_enabled),
            publisher,
            observed_payload_bytes: AtomicU64::new(default_payload_bytes.max(1)),
        }
    }

    fn rolling(&self) -> MutexGuard<'_, RollingState> {
        self.rolling.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count one completed response of `bytes` wire bytes.
    pub fn record_request(&self, bytes: u64) {
        self.rolling().record(Channel::Request, bytes, Instant::now(), Utc::now());
    }

    /// Count one emitted push of `bytes` (pre fan-out) bytes.
    ///
    /// The subscriber count is read at call time; if it changes between
    /// building and sending the payload the cost is attributed to the newer
    /// count.
    pub fn record_broadcast(&self, bytes: u64) {
        let cost = broadcast_cost(bytes, self.publisher.subscriber_count());
        self.rolling().record(Channel::Broadcast, cost, Instant::now(), Utc::now());
    }

    pub fn set_source_timestamp(&self, ts: DateTime<Utc>) {
        self.rolling().set_source_timestamp(ts, Utc::now());
    }

    /// Remember the size of a real upstream payload (positive sizes only).
    pub fn note_payload_size(&self, bytes: u64) {
        if bytes > 0 {
            self.observed_payload_bytes.store(bytes, Ordering::Relaxed);
        }
    }

    pub fn observed_payload_bytes(&self) -> u64 {
        self.observed_payload_bytes.load(Ordering::Relaxed)
    }

    pub fn gate(&self) -> &LiveEmitGate {
        &self.gate
    }

    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    /// Publish through the gate; returns whether anything was sent.
    pub fn publish_gated(&self, event: &str, body: &str) -> bool {
        if !self.gate.get() {
            return false;
        }
        self.publisher.publish(event, body);
        true
    }

    pub(crate) fn mark_emitted(&self, wall: DateTime<Utc>) {
        self.rolling().mark_emitted(wall);
    }

    /// Tick-boundary reading; moves every rate baseline.
    pub(crate) fn advance_window(&self) -> WindowReading {
        self.rolling().advance(Instant::now(), Utc::now())
    }

    /// On-demand reading; baselines stay where the last tick left them.
    pub(crate) fn peek_window(&self) -> WindowReading {
        self.rolling().read(Instant::now(), Utc::now())
    }

    pub(crate) fn reset_rolling(&self) {
        self.rolling().reset(Instant::now());
    }

    /// (events, bytes) recorded on `channel` since process start
    pub fn totals(&self, channel: Channel) -> (u64, u64) {
        self.rolling().totals(channel)
    }
}
