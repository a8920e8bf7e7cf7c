// Sampler tasks and the plumbing they share with the controller.
// Each sampler owns its state and publishes whole values; the controller hands
// out a stop signal and a run generation, and reads counters.

pub mod bandwidth;
pub mod connection;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::watch;

use crate::provider::{MetricsProvider, ProviderError};

/// Cooperative stop signal handed to a sampler at spawn time.
/// A dropped sender reads as stopped.
#[derive(Debug, Clone)]
pub struct RunSignal(watch::Receiver<bool>);

impl RunSignal {
    pub fn channel() -> (watch::Sender<bool>, RunSignal) {
        let (tx, rx) = watch::channel(true);
        (tx, RunSignal(rx))
    }

    pub fn is_running(&self) -> bool {
        *self.0.borrow() && self.0.has_changed().is_ok()
    }

    /// Resolves once the run has been stopped.
    pub async fn stopped(&mut self) {
        let _ = self.0.wait_for(|running| !*running).await;
    }
}

/// Identifies the run a sampler was spawned for. Once a newer run has
/// started, results from older runs are refused.
#[derive(Debug, Clone)]
pub struct RunGeneration {
    current: Arc<AtomicU64>,
    mine: u64,
}

impl RunGeneration {
    pub fn new(current: Arc<AtomicU64>, mine: u64) -> Self {
        Self { current, mine }
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.mine
    }

    /// Replaces the channel value unless a newer run has started. The check
    /// runs under the channel's write lock, so it can't interleave with a
    /// controller that bumps the generation under the same lock.
    pub fn publish<T>(&self, tx: &watch::Sender<T>, value: T) -> bool {
        tx.send_if_modified(move |slot| {
            if self.is_current() {
                *slot = value;
                true
            } else {
                false
            }
        })
    }
}

/// Tracks one live sampler task; the count drops when the task ends or is aborted.
pub struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    pub fn enter(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live.clone())
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Tick counters shared by both samplers across runs.
#[derive(Debug, Default)]
pub struct SamplerCounters {
    pub bandwidth_ticks: AtomicU64,
    pub connection_ticks: AtomicU64,
    /// Ticks dropped because the provider failed.
    pub skipped_ticks: AtomicU64,
}

impl SamplerCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Runs a provider call on the blocking pool.
async fn call_provider<T, F>(provider: &Arc<dyn MetricsProvider>, f: F) -> Result<T, ProviderError>
where
    T: Send + 'static,
    F: FnOnce(&dyn MetricsProvider) -> Result<T, ProviderError> + Send + 'static,
{
    let provider = provider.clone();
    tokio::task::spawn_blocking(move || f(provider.as_ref()))
        .await
        .map_err(|e| {
            if e.is_panic() {
                tracing::error!(error = %e, "metrics provider panicked");
                ProviderError::Panicked(e.to_string())
            } else {
                ProviderError::Unavailable(format!("provider task join: {e}"))
            }
        })?
}
