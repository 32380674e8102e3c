//! In-process synthetic request driver

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::DriverHandle;
use crate::context::MonitorContext;

/// Simulates `clients` pollers without touching the network.
///
/// Every timer records one request of `payload_bytes` per period and
/// refreshes the source timestamp, as a completed poll would.
#[derive(Debug, Clone, Copy)]
pub struct RequestDriver {
    pub period: Duration,
    pub payload_bytes: u64,
    pub clients: usize,
}

impl RequestDriver {
    pub fn new(period: Duration, payload_bytes: u64, clients: usize) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            payload_bytes: payload_bytes.max(1),
            clients: clients.max(1),
        }
    }

    /// First request fires one period after start.
    pub fn start(self, ctx: Arc<MonitorContext>) -> DriverHandle {
        let mut handle = DriverHandle::new("request");
        let bytes = self.payload_bytes;
        for _ in 0..self.clients {
            let ctx = ctx.clone();
            handle.spawn_periodic(self.period, false, move || {
                ctx.record_request(bytes);
                ctx.set_source_timestamp(Utc::now());
                async {}
            });
        }
        debug!(
            period_ms = self.period.as_millis() as u64,
            payload_bytes = bytes,
            clients = self.clients,
            "request driver started"
        );
        handle
    }
}
