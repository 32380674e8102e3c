//! Resource monitor and session engine
//!
//! [`ResourceMonitor`] owns the sampling loop, the session registry and the
//! drivers attached to the active session. It is a cheap `Clone` handle; all
//! clones share one state.
//!
//! Lock order: the session registry is always taken before the driver set.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::context::MonitorContext;
use crate::counters::Channel;
use crate::drivers::{CpuLoad, DriverHandle, PushDriver, RequestDriver};
use crate::error::{MonitorError, Result};
use crate::publisher::Publisher;
use crate::sampler::{default_probe, load_average_one, MemoryReading, ProcessProbe, ProcessSampler, ProcessUsage};
use crate::scheduler::SchedulerProbe;
use crate::session::{ChannelMode, SessionConfig, SessionMeta, SessionRecord};
use crate::snapshot::{Snapshot, SnapshotInputs, METRICS_EVENT};

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

// =============================================================================
// SESSION-SCOPED STATE
// =============================================================================

#[derive(Debug, Default)]
struct Registry {
    records: HashMap<String, SessionRecord>,
    active: Option<String>,
}

/// Everything started on behalf of the active session
#[derive(Debug, Default)]
struct SessionDrivers {
    push: Option<DriverHandle>,
    request: Option<DriverHandle>,
    poller: Option<DriverHandle>,
    load: Option<CpuLoad>,
    deadline: Option<JoinHandle<()>>,
}

impl SessionDrivers {
    fn stop_all(&mut self) {
        for mut handle in [self.push.take(), self.request.take(), self.poller.take()].into_iter().flatten() {
            handle.stop();
        }
        if let Some(mut load) = self.load.take() {
            load.stop();
        }
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
    }
}

// =============================================================================
// MONITOR
// =============================================================================

struct Inner {
    config: MonitorConfig,
    ctx: Arc<MonitorContext>,
    sampler: ProcessSampler,
    scheduler: SchedulerProbe,
    created_at: Instant,
    state: AtomicU8,
    tick_running: AtomicBool,
    push_controlled: AtomicBool,
    tick_cancel: Mutex<Option<CancellationToken>>,
    sessions: Mutex<Registry>,
    drivers: Mutex<SessionDrivers>,
}

/// Live resource monitor with measurement sessions.
#[derive(Clone)]
pub struct ResourceMonitor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("tick_interval_ms", &self.inner.config.effective_tick_interval_ms())
            .field("state", &self.inner.state.load(Ordering::Acquire))
            .field("context", &self.inner.ctx)
            .field("sampler", &self.inner.sampler)
            .finish()
    }
}

impl ResourceMonitor {
    /// Build a monitor with the default process probe for this build.
    pub fn new(config: MonitorConfig, publisher: Arc<dyn Publisher>) -> Result<Self> {
        let probe = if config.process_sampling_disabled {
            None
        } else {
            default_probe()
        };
        Self::with_probe(config, publisher, probe)
    }

    /// Build a monitor with an explicit process probe (`None` = fallback only).
    pub fn with_probe(
        config: MonitorConfig,
        publisher: Arc<dyn Publisher>,
        probe: Option<Arc<dyn ProcessProbe>>,
    ) -> Result<Self> {
        let ctx = Arc::new(MonitorContext::new(
            publisher,
            config.live_emit_enabled,
            config.default_payload_bytes,
        ));
        let sampler = ProcessSampler::new(probe, Duration::from_millis(config.cpu_sample_interval_ms));
        let scheduler = SchedulerProbe::new(Duration::from_millis(config.delay_resolution_ms))?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                ctx,
                sampler,
                scheduler,
                created_at: Instant::now(),
                state: AtomicU8::new(STATE_IDLE),
                tick_running: AtomicBool::new(false),
                push_controlled: AtomicBool::new(false),
                tick_cancel: Mutex::new(None),
                sessions: Mutex::new(Registry::default()),
                drivers: Mutex::new(SessionDrivers::default()),
            }),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Shared context for external ingestion points and custom drivers
    pub fn context(&self) -> &Arc<MonitorContext> {
        &self.inner.ctx
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start the scheduler probe and the sampling loop.
    ///
    /// Must be called inside a Tokio runtime. Calling it again while running
    /// is a no-op; after [`shutdown`](Self::shutdown) it fails.
    pub fn init(&self) -> Result<()> {
        match self
            .inner
            .state
            .compare_exchange(STATE_IDLE, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(STATE_RUNNING) => return Ok(()),
            Err(_) => return Err(MonitorError::Config("monitor has been shut down".into())),
        }

        let tick_ms = self.inner.config.effective_tick_interval_ms();
        self.inner.scheduler.enable();

        let token = CancellationToken::new();
        *self.inner.tick_cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        tokio::spawn(run_tick_loop(
            Arc::downgrade(&self.inner),
            Duration::from_millis(tick_ms),
            token,
        ));

        info!(
            tick_ms,
            live_emit = self.inner.ctx.gate().get(),
            process_sampling = self.inner.sampler.is_enabled(),
            "resource monitor started"
        );
        Ok(())
    }

    /// Stop the loop, the probe and every driver. Idempotent.
    pub fn shutdown(&self) {
        // under the registry lock so no session can start its drivers halfway through
        let _reg = self.inner.registry();
        if self.inner.state.swap(STATE_STOPPED, Ordering::AcqRel) == STATE_STOPPED {
            return;
        }
        if let Some(token) = self.inner.tick_cancel.lock().unwrap_or_else(|e| e.into_inner()).take() {
            token.cancel();
        }
        self.inner.scheduler.disable();
        self.inner.drivers().stop_all();
        self.inner.push_controlled.store(false, Ordering::Release);
        info!("resource monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == STATE_RUNNING
    }

    // -------------------------------------------------------------------------
    // Ingestion
    // -------------------------------------------------------------------------

    /// Count one served response of `bytes` bytes.
    pub fn record_request(&self, bytes: u64) {
        self.inner.ctx.record_request(bytes);
    }

    /// Count one push of `bytes` bytes, fanned out to every subscriber.
    pub fn record_broadcast(&self, bytes: u64) {
        self.inner.ctx.record_broadcast(bytes);
    }

    /// Set the upstream data timestamp from an ISO-8601 string.
    pub fn set_external_source_timestamp(&self, iso: &str) -> Result<()> {
        let ts = DateTime::parse_from_rfc3339(iso.trim())
            .map_err(|e| MonitorError::Validation(format!("invalid source timestamp {:?}: {}", iso, e)))?;
        self.inner.ctx.set_source_timestamp(ts.with_timezone(&Utc));
        Ok(())
    }

    pub fn set_source_timestamp(&self, ts: DateTime<Utc>) {
        self.inner.ctx.set_source_timestamp(ts);
    }

    pub fn note_payload_size(&self, bytes: u64) {
        self.inner.ctx.note_payload_size(bytes);
    }

    /// (events, bytes) recorded on `channel` since construction
    pub fn totals(&self, channel: Channel) -> (u64, u64) {
        self.inner.ctx.totals(channel)
    }

    // -------------------------------------------------------------------------
    // Emission gate
    // -------------------------------------------------------------------------

    pub fn set_live_emit_enabled(&self, enabled: bool) {
        self.inner.ctx.gate().set(enabled);
        info!(enabled, "live emission toggled");
    }

    pub fn is_live_emit_enabled(&self) -> bool {
        self.inner.ctx.gate().get()
    }

    /// Whether a fixed-rate push driver is currently running
    pub fn is_push_controlled(&self) -> bool {
        self.inner.push_controlled.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------
    // Sampling
    // -------------------------------------------------------------------------

    /// Snapshot on demand. Rate baselines are left to the sampling loop.
    pub async fn sample_now(&self) -> Snapshot {
        self.inner.compute_snapshot(false).await
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Start a session, finishing any active one first.
    ///
    /// Resets the rolling state and starts the drivers the configuration
    /// asks for. Must be called inside a Tokio runtime. Fails after
    /// [`shutdown`](Self::shutdown).
    pub fn start_session(&self, config: SessionConfig) -> Result<SessionRecord> {
        let config = config.normalize()?;
        let mut reg = self.inner.registry();
        if self.inner.state.load(Ordering::Acquire) == STATE_STOPPED {
            return Err(MonitorError::Config("monitor has been shut down".into()));
        }
        if let Some(prev) = reg.active.clone() {
            debug!(session_id = %prev, "finishing active session before start");
            self.inner.finish_locked(&mut reg, &prev);
        }

        self.inner.ctx.reset_rolling();
        self.inner.scheduler.reset();
        self.inner.sampler.invalidate();

        let id = Uuid::new_v4().to_string();
        let mut drivers = match self.inner.start_drivers(&config) {
            Ok(drivers) => drivers,
            Err(e) => {
                self.inner.push_controlled.store(false, Ordering::Release);
                if config.mode == ChannelMode::Push {
                    self.inner.ctx.gate().restore();
                }
                warn!(error = %e, label = %config.label, "session drivers failed to start");
                return Err(e);
            }
        };
        if let Some(limit) = config.duration() {
            drivers.deadline = Some(spawn_deadline(Arc::downgrade(&self.inner), id.clone(), limit));
        }

        let meta = SessionMeta {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            sensor_interval_ms: self.inner.config.sensor_interval_ms,
            tick_interval_ms: self.inner.config.effective_tick_interval_ms(),
        };
        let record = SessionRecord::new(id.clone(), config, meta);

        *self.inner.drivers() = drivers;
        reg.records.insert(id.clone(), record.clone());
        reg.active = Some(id.clone());

        info!(
            session_id = %id,
            label = %record.config.label,
            mode = %record.config.mode,
            live_emit = self.inner.ctx.gate().get(),
            "session started"
        );
        Ok(record)
    }

    /// Finish a session. Finishing a finished session returns it unchanged.
    pub fn finish_session(&self, id: &str) -> Option<SessionRecord> {
        let mut reg = self.inner.registry();
        self.inner.finish_locked(&mut reg, id)
    }

    /// Drop every session record; returns how many were cleared.
    pub fn reset_sessions(&self) -> usize {
        let mut reg = self.inner.registry();
        let count = reg.records.len();
        reg.records.clear();
        reg.active = None;
        self.inner.drivers().stop_all();
        self.inner.push_controlled.store(false, Ordering::Release);
        self.inner.ctx.reset_rolling();
        self.inner.ctx.gate().restore();
        info!(cleared = count, "sessions reset");
        count
    }

    /// Remove one session, finishing it first if it is active.
    pub fn delete_session(&self, id: &str) -> bool {
        let mut reg = self.inner.registry();
        if reg.active.as_deref() == Some(id) {
            self.inner.finish_locked(&mut reg, id);
        }
        reg.records.remove(id).is_some()
    }

    pub fn get_session(&self, id: &str) -> Option<SessionRecord> {
        self.inner.registry().records.get(id).cloned()
    }

    /// Every session, newest start first
    pub fn list_sessions(&self) -> Vec<SessionRecord> {
        let mut all: Vec<SessionRecord> = self.inner.registry().records.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.inner.registry().active.clone()
    }
}

// =============================================================================
// INTERNALS
// =============================================================================

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn drivers(&self) -> MutexGuard<'_, SessionDrivers> {
        self.drivers.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn compute_snapshot(&self, advance: bool) -> Snapshot {
        let usage = self.sampler.sample().await;
        self.assemble_snapshot(usage, advance)
    }

    /// One synchronous read of every counter.
    fn assemble_snapshot(&self, usage: ProcessUsage, advance: bool) -> Snapshot {
        let memory = MemoryReading::current();
        let (scheduler, window) = if advance {
            (self.scheduler.read(), self.ctx.advance_window())
        } else {
            (self.scheduler.peek(), self.ctx.peek_window())
        };
        Snapshot::assemble(SnapshotInputs {
            timestamp: Utc::now(),
            usage,
            memory,
            scheduler,
            subscribers: self.ctx.subscriber_count(),
            window,
            load_avg_1: load_average_one(),
            uptime_sec: self.created_at.elapsed().as_secs_f64(),
        })
    }

    async fn tick(&self) {
        // the only suspension point
        let usage = self.sampler.sample().await;

        // the registry guard keeps a session start from resetting the
        // rolling state between this read and the append below
        let mut reg = self.registry();
        let snapshot = self.assemble_snapshot(usage, true);

        if let Some(id) = reg.active.clone() {
            let limit_reached = match reg.records.get_mut(&id) {
                Some(rec) if rec.is_active() => {
                    rec.samples.push(snapshot.clone());
                    rec.limit_reached(Utc::now())
                }
                _ => false,
            };
            if limit_reached {
                debug!(session_id = %id, "session limit reached");
                self.finish_locked(&mut reg, &id);
            }
        }
        drop(reg);

        if self.ctx.gate().get() {
            match serde_json::to_string(&snapshot) {
                Ok(body) => {
                    self.ctx.publisher().publish(METRICS_EVENT, &body);
                    self.ctx.mark_emitted(Utc::now());
                }
                Err(e) => warn!(error = %e, "failed to encode snapshot"),
            }
        }
    }

    fn start_drivers(&self, config: &SessionConfig) -> Result<SessionDrivers> {
        let mut drivers = SessionDrivers::default();
        let payload = config
            .assumed_payload_bytes
            .unwrap_or_else(|| self.ctx.observed_payload_bytes());

        match config.mode {
            ChannelMode::Push => {
                if self.ctx.gate().force_open() {
                    info!("live emission forced on for push session");
                }
                if let Some(hz) = config.rate_hz() {
                    drivers.push = Some(PushDriver::new(hz, payload).start(self.ctx.clone()));
                    self.push_controlled.store(true, Ordering::Release);
                } else if let Some(n) = config.clients_ws.filter(|n| *n > 0) {
                    let hz = 1000.0 / self.config.sensor_interval_ms.max(1) as f64;
                    drivers.push = Some(PushDriver::new(hz, payload).with_clients(n).start(self.ctx.clone()));
                }
            }
            ChannelMode::Poll => {
                let period = config.polling_interval();
                let clients = config.clients_http.unwrap_or(0);
                if config.internal_http_driver {
                    drivers.poller = self.start_poller(period, clients, payload)?;
                } else if clients > 0 {
                    drivers.request = Some(RequestDriver::new(period, payload, clients).start(self.ctx.clone()));
                }
            }
        }

        if let Some(pct) = config.load_cpu_pct {
            drivers.load = Some(CpuLoad::start(pct, config.load_workers.unwrap_or(1))?);
        }
        Ok(drivers)
    }

    #[cfg(feature = "http-poller")]
    fn start_poller(&self, period: Duration, clients: usize, _payload: u64) -> Result<Option<DriverHandle>> {
        let poller = crate::drivers::HttpPoller::new(&self.config.self_poll_url, period, clients)?;
        Ok(Some(poller.start()?))
    }

    #[cfg(not(feature = "http-poller"))]
    fn start_poller(&self, period: Duration, clients: usize, payload: u64) -> Result<Option<DriverHandle>> {
        warn!("http-poller feature disabled; using synthetic request driver");
        Ok(Some(RequestDriver::new(period, payload, clients).start(self.ctx.clone())))
    }

    fn finish_locked(&self, reg: &mut Registry, id: &str) -> Option<SessionRecord> {
        let rec = reg.records.get_mut(id)?;
        if !rec.is_active() {
            return Some(rec.clone());
        }
        rec.finished_at = Some(Utc::now());
        let mode = rec.config.mode;
        let finished = rec.clone();
        if reg.active.as_deref() == Some(id) {
            reg.active = None;
            self.drivers().stop_all();
            self.push_controlled.store(false, Ordering::Release);
        }
        if mode == ChannelMode::Push {
            if let Some(prev) = self.ctx.gate().restore() {
                info!(enabled = prev, "live emission restored");
            }
        }
        info!(session_id = %id, samples = finished.samples.len(), "session finished");
        Some(finished)
    }

    fn finish_if_active(&self, id: &str) {
        let mut reg = self.registry();
        if reg.active.as_deref() == Some(id) {
            self.finish_locked(&mut reg, id);
        }
    }
}

/// Clears the in-flight flag however the tick ends.
struct TickGuard(Arc<Inner>);

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.tick_running.store(false, Ordering::Release);
    }
}

async fn run_tick_loop(inner: Weak<Inner>, period: Duration, token: CancellationToken) {
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.tick_running.swap(true, Ordering::AcqRel) {
            debug!("previous tick still running; skipping");
            continue;
        }
        let work = tokio::spawn(async move {
            let guard = TickGuard(inner);
            guard.0.tick().await;
        });
        tokio::spawn(async move {
            if let Err(e) = work.await {
                if e.is_panic() {
                    error!("monitor tick panicked");
                }
            }
        });
    }
    debug!("tick loop stopped");
}

fn spawn_deadline(inner: Weak<Inner>, id: String, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        time::sleep(after).await;
        if let Some(inner) = inner.upgrade() {
            inner.finish_if_active(&id);
        }
    })
}
