// Monitor controller: start/stop lifecycle for the bandwidth and connection samplers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::models::{BandwidthHistory, ConnectionSnapshot, MonitorState};
use crate::provider::MetricsProvider;
use crate::sampler::{
    LiveGuard, RunGeneration, RunSignal, SamplerCounters, bandwidth, connection,
};
use crate::sink::PresentationSink;

pub const DEFAULT_BANDWIDTH_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_CONNECTION_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;
pub const DEFAULT_RECENT_CONNECTIONS: usize = 10;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub bandwidth_interval: Duration,
    pub connection_interval: Duration,
    pub history_capacity: usize,
    pub recent_connections_limit: usize,
    /// How long `shutdown` waits for in-flight ticks before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bandwidth_interval: DEFAULT_BANDWIDTH_INTERVAL,
            connection_interval: DEFAULT_CONNECTION_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            recent_connections_limit: DEFAULT_RECENT_CONNECTIONS,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("monitor must be created inside a Tokio runtime")]
    NoRuntime,
}

/// Tick totals since the monitor was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub bandwidth_ticks: u64,
    pub connection_ticks: u64,
    pub skipped_ticks: u64,
}

/// The samplers of one Running period.
struct Run {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

struct Inner {
    state: MonitorState,
    run: Option<Run>,
    /// Tasks of stopped runs that may still be finishing a tick.
    draining: Vec<JoinHandle<()>>,
}

/// Owns the sampler lifecycle and the latest published results.
///
/// `start`/`stop` are synchronous and may be called from any thread (a UI
/// event loop, for instance); both are idempotent. Results are pushed to the
/// sink given at construction and can also be polled or watched.
pub struct Monitor {
    provider: Arc<dyn MetricsProvider>,
    sink: Arc<dyn PresentationSink>,
    config: MonitorConfig,
    runtime: Handle,
    inner: Mutex<Inner>,
    history_tx: watch::Sender<Arc<BandwidthHistory>>,
    snapshot_tx: watch::Sender<Arc<ConnectionSnapshot>>,
    counters: Arc<SamplerCounters>,
    live: Arc<AtomicUsize>,
    /// Bumped by every `start`; samplers of older runs may no longer publish.
    generation: Arc<AtomicU64>,
}

impl Monitor {
    /// Must be called from within a Tokio runtime; samplers are spawned onto it.
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        sink: Arc<dyn PresentationSink>,
        config: MonitorConfig,
    ) -> Result<Self, MonitorError> {
        let runtime = Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let (history_tx, _) = watch::channel(Arc::new(BandwidthHistory::new(
            config.history_capacity,
        )));
        let (snapshot_tx, _) = watch::channel(Arc::new(ConnectionSnapshot::default()));
        Ok(Self {
            provider,
            sink,
            config,
            runtime,
            inner: Mutex::new(Inner {
                state: MonitorState::Stopped,
                run: None,
                draining: Vec::new(),
            }),
            history_tx,
            snapshot_tx,
            counters: Arc::new(SamplerCounters::default()),
            live: Arc::new(AtomicUsize::new(0)),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stopped -> Running. Spawns one bandwidth and one connection sampler;
    /// a no-op while already running. Bandwidth history restarts empty.
    pub fn start(&self) {
        {
            let mut inner = self.lock();
            if inner.state.is_running() {
                tracing::debug!(operation = "start", "monitor already running");
                return;
            }
            inner.draining.retain(|h| !h.is_finished());

            let (stop_tx, signal) = RunSignal::channel();
            // bump under the history lock so a stale tick lands before the reset or not at all
            let mut mine = 0;
            self.history_tx.send_modify(|history| {
                mine = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                *history = Arc::new(BandwidthHistory::new(self.config.history_capacity));
            });
            let generation = RunGeneration::new(self.generation.clone(), mine);

            let _rt = self.runtime.enter();
            let bandwidth = bandwidth::spawn(
                bandwidth::BandwidthSamplerDeps {
                    provider: self.provider.clone(),
                    sink: self.sink.clone(),
                    history_tx: self.history_tx.clone(),
                    signal: signal.clone(),
                    generation: generation.clone(),
                    counters: self.counters.clone(),
                    live: LiveGuard::enter(&self.live),
                },
                bandwidth::BandwidthSamplerConfig {
                    interval: self.config.bandwidth_interval,
                    history_capacity: self.config.history_capacity,
                },
            );
            let connection = connection::spawn(
                connection::ConnectionSamplerDeps {
                    provider: self.provider.clone(),
                    sink: self.sink.clone(),
                    snapshot_tx: self.snapshot_tx.clone(),
                    signal,
                    generation,
                    counters: self.counters.clone(),
                    live: LiveGuard::enter(&self.live),
                },
                connection::ConnectionSamplerConfig {
                    interval: self.config.connection_interval,
                    recent_connections_limit: self.config.recent_connections_limit,
                },
            );

            inner.run = Some(Run {
                stop_tx,
                handles: vec![bandwidth, connection],
            });
            inner.state = MonitorState::Running;
        }
        tracing::info!(
            provider = self.provider.name(),
            bandwidth_interval_ms = self.config.bandwidth_interval.as_millis() as u64,
            connection_interval_ms = self.config.connection_interval.as_millis() as u64,
            "monitoring started"
        );
        self.sink.on_state_change(MonitorState::Running);
    }

    /// Running -> Stopped. Samplers finish and publish their current tick,
    /// then exit; this does not wait for them. A no-op while stopped.
    pub fn stop(&self) {
        {
            let mut inner = self.lock();
            if !inner.state.is_running() {
                tracing::debug!(operation = "stop", "monitor already stopped");
                return;
            }
            inner.state = MonitorState::Stopped;
            if let Some(run) = inner.run.take() {
                let _ = run.stop_tx.send(false);
                inner.draining.extend(run.handles);
            }
        }
        let stats = self.stats();
        tracing::info!(
            bandwidth_ticks = stats.bandwidth_ticks,
            connection_ticks = stats.connection_ticks,
            skipped_ticks = stats.skipped_ticks,
            "monitoring stopped"
        );
        self.sink.on_state_change(MonitorState::Stopped);
    }

    /// Stops, then waits up to the shutdown grace for sampler tasks to finish.
    /// Tasks still pending after that are aborted, so none publishes afterwards.
    pub async fn shutdown(&self) {
        self.stop();
        let mut handles = std::mem::take(&mut self.lock().draining);
        if handles.is_empty() {
            return;
        }

        let grace = self.config.shutdown_grace;
        let joined =
            tokio::time::timeout(grace, futures_util::future::join_all(handles.iter_mut())).await;
        match joined {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result
                        && e.is_panic()
                    {
                        tracing::warn!(error = %e, "sampler task panicked");
                    }
                }
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "sampler tasks still running after grace period; aborting"
                );
                for handle in &handles {
                    handle.abort();
                }
                for handle in handles {
                    let _ = handle.await;
                }
            }
        }
        tracing::debug!("monitor shut down");
    }

    pub fn state(&self) -> MonitorState {
        self.lock().state
    }

    /// Latest published bandwidth history.
    pub fn history(&self) -> Arc<BandwidthHistory> {
        self.history_tx.borrow().clone()
    }

    /// Latest published connection snapshot (empty until the first connection tick).
    pub fn connections(&self) -> Arc<ConnectionSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe_bandwidth(&self) -> watch::Receiver<Arc<BandwidthHistory>> {
        self.history_tx.subscribe()
    }

    pub fn subscribe_connections(&self) -> watch::Receiver<Arc<ConnectionSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Sampler tasks that have not yet exited, across all runs.
    pub fn active_samplers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            bandwidth_ticks: self.counters.bandwidth_ticks.load(Ordering::Relaxed),
            connection_ticks: self.counters.connection_ticks.load(Ordering::Relaxed),
            skipped_ticks: self.counters.skipped_ticks.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = inner.run.take() {
            let _ = run.stop_tx.send(false);
        }
    }
}
