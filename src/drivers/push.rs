//! Fixed-rate push driver

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::{period_for_rate, DriverHandle};
use crate::context::MonitorContext;
use crate::publisher::DATA_EVENT;

/// Shortest period a push timer may run at
pub const MIN_PUSH_PERIOD_MS: u64 = 5;

/// Emits synthetic payloads at a fixed rate through the broadcast path.
#[derive(Debug, Clone, Copy)]
pub struct PushDriver {
    pub rate_hz: f64,
    pub payload_bytes: u64,
    /// Independent timers, each emitting at `rate_hz`
    pub clients: usize,
}

impl PushDriver {
    pub fn new(rate_hz: f64, payload_bytes: u64) -> Self {
        Self {
            rate_hz,
            payload_bytes: payload_bytes.max(1),
            clients: 1,
        }
    }

    pub fn with_clients(mut self, clients: usize) -> Self {
        self.clients = clients.max(1);
        self
    }

    /// Start the timers; the first emission happens immediately.
    ///
    /// Each emission is published only while the gate is open, but is always
    /// counted and always refreshes the source timestamp.
    pub fn start(self, ctx: Arc<MonitorContext>) -> DriverHandle {
        let period = period_for_rate(self.rate_hz, MIN_PUSH_PERIOD_MS);
        let body: Arc<str> = Arc::from(synthetic_payload(self.payload_bytes));
        let bytes = body.len() as u64;

        let mut handle = DriverHandle::new("push");
        for _ in 0..self.clients {
            let ctx = ctx.clone();
            let body = body.clone();
            handle.spawn_periodic(period, true, move || {
                ctx.publish_gated(DATA_EVENT, &body);
                ctx.record_broadcast(bytes);
                ctx.set_source_timestamp(Utc::now());
                async {}
            });
        }
        debug!(
            rate_hz = self.rate_hz,
            period_ms = period.as_millis() as u64,
            payload_bytes = bytes,
            clients = self.clients,
            "push driver started"
        );
        handle
    }
}

/// JSON body of exactly `bytes` bytes (minimum the bare envelope).
pub fn synthetic_payload(bytes: u64) -> String {
    const HEAD: &str = "{\"synthetic\":true,\"pad\":\"";
    const TAIL: &str = "\"}";
    let envelope = HEAD.len() + TAIL.len();
    let target = usize::try_from(bytes).unwrap_or(usize::MAX).max(envelope);
    let mut out = String::with_capacity(target);
    out.push_str(HEAD);
    out.extend(std::iter::repeat('x').take(target - envelope));
    out.push_str(TAIL);
    out
}
