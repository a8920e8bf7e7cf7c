// Bandwidth sampler: counter deltas -> KB per sample -> bounded history

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::Instrument;

use super::{LiveGuard, RunGeneration, RunSignal, SamplerCounters, call_provider};
use crate::models::{BYTES_PER_KB, BandwidthHistory, Counters, SamplePoint, now_millis};
use crate::provider::MetricsProvider;
use crate::sink::PresentationSink;

/// KB moved between two cumulative readings. A counter that went backwards
/// (interface reset, wraparound) yields 0.
pub fn kb_delta(prev: u64, cur: u64) -> f64 {
    cur.saturating_sub(prev) as f64 / BYTES_PER_KB
}

/// Turns successive cumulative counter readings into per-sample rates.
#[derive(Debug, Clone, Copy)]
pub struct BandwidthTracker {
    prev: Counters,
}

impl BandwidthTracker {
    /// Seeds from a first reading, which produces no sample of its own.
    pub fn seeded(initial: Counters) -> Self {
        Self { prev: initial }
    }

    pub fn advance(&mut self, cur: Counters, timestamp: u64) -> SamplePoint {
        let point = SamplePoint {
            upload_kbps: kb_delta(self.prev.bytes_sent, cur.bytes_sent),
            download_kbps: kb_delta(self.prev.bytes_recv, cur.bytes_recv),
            timestamp,
        };
        self.prev = cur;
        point
    }
}

pub struct BandwidthSamplerDeps {
    pub provider: Arc<dyn MetricsProvider>,
    pub sink: Arc<dyn PresentationSink>,
    pub history_tx: watch::Sender<Arc<BandwidthHistory>>,
    pub signal: RunSignal,
    pub generation: RunGeneration,
    pub counters: Arc<SamplerCounters>,
    pub live: LiveGuard,
}

pub struct BandwidthSamplerConfig {
    pub interval: Duration,
    pub history_capacity: usize,
}

/// Spawns the bandwidth loop. Each run starts from an empty history.
pub fn spawn(deps: BandwidthSamplerDeps, config: BandwidthSamplerConfig) -> tokio::task::JoinHandle<()> {
    let BandwidthSamplerDeps {
        provider,
        sink,
        history_tx,
        mut signal,
        generation,
        counters,
        live,
    } = deps;
    let span = tracing::debug_span!(
        "bandwidth_sampler",
        interval_ms = config.interval.as_millis() as u64
    );

    tokio::spawn(
        async move {
            let _live = live;
            let mut tracker = match call_provider(&provider, |p| p.read_counters()).await {
                Ok(c) => Some(BandwidthTracker::seeded(c)),
                Err(e) => {
                    tracing::warn!(error = %e, operation = "read_counters", "seed reading failed");
                    None
                }
            };
            let mut history = BandwidthHistory::new(config.history_capacity);

            let mut tick = interval(config.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // first tick completes immediately
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    _ = signal.stopped() => break,
                }
                if !signal.is_running() {
                    break;
                }

                let cur = match call_provider(&provider, |p| p.read_counters()).await {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(error = %e, operation = "read_counters", "counter read failed");
                        SamplerCounters::bump(&counters.skipped_ticks);
                        continue;
                    }
                };
                let point = match tracker.as_mut() {
                    Some(t) => t.advance(cur, now_millis()),
                    None => {
                        tracker = Some(BandwidthTracker::seeded(cur));
                        continue;
                    }
                };
                history.push(point);
                SamplerCounters::bump(&counters.bandwidth_ticks);

                // a tick in flight at stop still publishes, unless a newer run owns the channel
                let published = Arc::new(history.clone());
                if !generation.publish(&history_tx, published.clone()) {
                    tracing::debug!("newer run started; dropping tick");
                    break;
                }
                sink.on_bandwidth_update(&published);
                tracing::trace!(
                    upload_kbps = point.upload_kbps,
                    download_kbps = point.download_kbps,
                    samples = published.len(),
                    "bandwidth tick"
                );
            }
            tracing::debug!("bandwidth sampler stopped");
        }
        .instrument(span),
    )
}
