// Connection sampler: connection table -> ConnectionSnapshot

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::Instrument;

use super::{LiveGuard, RunGeneration, RunSignal, SamplerCounters, call_provider};
use crate::models::{
    ConnectionRecord, ConnectionSnapshot, ConnectionStatus, ProcessName, RawConnection, now_millis,
};
use crate::provider::MetricsProvider;
use crate::sink::PresentationSink;

/// Looks up the owner of a socket. Exited processes, denied lookups and
/// sockets without an owner all come back as `ProcessName::Unknown`.
pub fn resolve_process_name(provider: &dyn MetricsProvider, pid: Option<u32>) -> ProcessName {
    let Some(pid) = pid else {
        return ProcessName::Unknown;
    };
    match provider.process_name(pid) {
        Ok(name) if !name.is_empty() => ProcessName::Known(name),
        Ok(_) => ProcessName::Unknown,
        Err(e) => {
            tracing::trace!(pid, error = %e, "process lookup failed");
            ProcessName::Unknown
        }
    }
}

/// Classifies one connection table into a snapshot.
///
/// Only ESTABLISHED sockets with a peer address are counted. The first
/// `recent_limit` of those, in table order, are listed with their owner.
pub fn build_snapshot(
    connections: &[RawConnection],
    provider: &dyn MetricsProvider,
    recent_limit: usize,
    timestamp: u64,
) -> ConnectionSnapshot {
    let mut snapshot = ConnectionSnapshot {
        timestamp,
        ..Default::default()
    };
    let mut names: HashMap<u32, ProcessName> = HashMap::new();

    for conn in connections
        .iter()
        .filter(|c| c.status == ConnectionStatus::Established)
    {
        let Some(remote) = conn.remote_addr else {
            continue;
        };
        *snapshot.protocol_counts.entry(conn.protocol).or_insert(0) += 1;
        snapshot.distinct_remote_hosts.insert(remote.ip());

        if snapshot.recent_connections.len() >= recent_limit {
            continue;
        }
        let process_name = match conn.pid {
            Some(pid) => names
                .entry(pid)
                .or_insert_with(|| resolve_process_name(provider, Some(pid)))
                .clone(),
            None => ProcessName::Unknown,
        };
        snapshot.recent_connections.push(ConnectionRecord {
            protocol: conn.protocol,
            local_port: conn.local_addr.port(),
            remote_ip: remote.ip(),
            remote_port: remote.port(),
            process_name,
            status: conn.status,
        });
    }
    snapshot
}

pub struct ConnectionSamplerDeps {
    pub provider: Arc<dyn MetricsProvider>,
    pub sink: Arc<dyn PresentationSink>,
    pub snapshot_tx: watch::Sender<Arc<ConnectionSnapshot>>,
    pub signal: RunSignal,
    pub generation: RunGeneration,
    pub counters: Arc<SamplerCounters>,
    pub live: LiveGuard,
}

pub struct ConnectionSamplerConfig {
    pub interval: Duration,
    pub recent_connections_limit: usize,
}

/// Spawns the connection loop. A failed table read skips the tick and keeps
/// the previous snapshot. A tick in flight when the run is stopped still
/// publishes, unless a newer run has started meanwhile.
pub fn spawn(
    deps: ConnectionSamplerDeps,
    config: ConnectionSamplerConfig,
) -> tokio::task::JoinHandle<()> {
    let ConnectionSamplerDeps {
        provider,
        sink,
        snapshot_tx,
        mut signal,
        generation,
        counters,
        live,
    } = deps;
    let ConnectionSamplerConfig {
        interval: period,
        recent_connections_limit,
    } = config;
    let span = tracing::debug_span!("connection_sampler", interval_ms = period.as_millis() as u64);

    tokio::spawn(
        async move {
            let _live = live;
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    _ = signal.stopped() => break,
                }
                if !signal.is_running() {
                    break;
                }

                let result = call_provider(&provider, move |p| {
                    let table = p.list_connections()?;
                    Ok(build_snapshot(
                        &table,
                        p,
                        recent_connections_limit,
                        now_millis(),
                    ))
                })
                .await;
                let snapshot = match result {
                    Ok(s) => Arc::new(s),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            operation = "list_connections",
                            "connection table read failed"
                        );
                        SamplerCounters::bump(&counters.skipped_ticks);
                        continue;
                    }
                };
                SamplerCounters::bump(&counters.connection_ticks);

                if !generation.publish(&snapshot_tx, snapshot.clone()) {
                    tracing::debug!("newer run started; dropping tick");
                    break;
                }
                sink.on_connection_update(&snapshot);
                tracing::debug!(
                    connections = snapshot.total_connections(),
                    remote_hosts = snapshot.distinct_remote_hosts.len(),
                    "connection tick"
                );
            }
            tracing::debug!("connection sampler stopped");
        }
        .instrument(span),
    )
}
