// Shared test helpers: scripted provider and a sink that records everything

#![allow(dead_code)]

use netpulse::models::*;
use netpulse::provider::{MetricsProvider, ProviderError};
use netpulse::sink::PresentationSink;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Provider whose counters follow a script (the last reading repeats once
/// the script runs out) and whose connection table is fixed.
#[derive(Default)]
pub struct FakeProvider {
    counters: Mutex<Vec<Counters>>,
    counter_reads: AtomicUsize,
    connections: Vec<RawConnection>,
    deny_connections: bool,
    names: HashMap<u32, String>,
    name_lookups: AtomicUsize,
    held_read: Option<usize>,
    gate: ReadGate,
}

/// Parks one scripted counter read until the test releases it.
#[derive(Default)]
struct ReadGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Default)]
struct GateState {
    parked: bool,
    released: bool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counters(mut self, script: Vec<(u64, u64)>) -> Self {
        self.counters = Mutex::new(
            script
                .into_iter()
                .map(|(bytes_sent, bytes_recv)| Counters {
                    bytes_sent,
                    bytes_recv,
                })
                .collect(),
        );
        self
    }

    /// Counters growing by `step` bytes in each direction per read.
    pub fn with_linear_counters(self, step: u64, reads: u64) -> Self {
        self.with_counters((0..reads).map(|i| (i * step, i * step)).collect())
    }

    pub fn with_connections(mut self, connections: Vec<RawConnection>) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_process(mut self, pid: u32, name: &str) -> Self {
        self.names.insert(pid, name.to_string());
        self
    }

    pub fn deny_connections(mut self) -> Self {
        self.deny_connections = true;
        self
    }

    /// Blocks the `index`-th counter read (0-based) until `release_read`.
    pub fn hold_read(mut self, index: usize) -> Self {
        self.held_read = Some(index);
        self
    }

    pub fn read_is_held(&self) -> bool {
        self.gate.state.lock().unwrap().parked
    }

    pub fn release_read(&self) {
        self.gate.state.lock().unwrap().released = true;
        self.gate.changed.notify_all();
    }

    pub fn counter_reads(&self) -> usize {
        self.counter_reads.load(Ordering::SeqCst)
    }

    pub fn name_lookups(&self) -> usize {
        self.name_lookups.load(Ordering::SeqCst)
    }
}

impl MetricsProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn read_counters(&self) -> Result<Counters, ProviderError> {
        let i = self.counter_reads.fetch_add(1, Ordering::SeqCst);
        if self.held_read == Some(i) {
            let mut state = self.gate.state.lock().unwrap();
            state.parked = true;
            while !state.released {
                state = self.gate.changed.wait(state).unwrap();
            }
        }
        let script = self.counters.lock().unwrap();
        Ok(script
            .get(i)
            .or_else(|| script.last())
            .copied()
            .unwrap_or_default())
    }

    fn list_connections(&self) -> Result<Vec<RawConnection>, ProviderError> {
        if self.deny_connections {
            return Err(ProviderError::PermissionDenied("/proc/net/tcp".into()));
        }
        Ok(self.connections.clone())
    }

    fn process_name(&self, pid: u32) -> Result<String, ProviderError> {
        self.name_lookups.fetch_add(1, Ordering::SeqCst);
        self.names
            .get(&pid)
            .cloned()
            .ok_or(ProviderError::NotFound { pid })
    }
}

pub fn conn(
    protocol: Protocol,
    local: &str,
    remote: Option<&str>,
    status: ConnectionStatus,
    pid: Option<u32>,
) -> RawConnection {
    RawConnection {
        protocol,
        local_addr: local.parse::<SocketAddr>().unwrap(),
        remote_addr: remote.map(|r| r.parse::<SocketAddr>().unwrap()),
        status,
        pid,
    }
}

pub fn established_tcp(local_port: u16, remote: &str, pid: u32) -> RawConnection {
    conn(
        Protocol::Tcp,
        &format!("192.168.1.10:{local_port}"),
        Some(remote),
        ConnectionStatus::Established,
        Some(pid),
    )
}

#[derive(Default)]
pub struct RecordingSink {
    pub bandwidth: Mutex<Vec<BandwidthHistory>>,
    pub connections: Mutex<Vec<ConnectionSnapshot>>,
    pub states: Mutex<Vec<MonitorState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bandwidth_updates(&self) -> Vec<BandwidthHistory> {
        self.bandwidth.lock().unwrap().clone()
    }

    pub fn connection_updates(&self) -> Vec<ConnectionSnapshot> {
        self.connections.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<MonitorState> {
        self.states.lock().unwrap().clone()
    }
}

impl PresentationSink for RecordingSink {
    fn on_bandwidth_update(&self, history: &BandwidthHistory) {
        self.bandwidth.lock().unwrap().push(history.clone());
    }

    fn on_connection_update(&self, snapshot: &ConnectionSnapshot) {
        self.connections.lock().unwrap().push(snapshot.clone());
    }

    fn on_state_change(&self, state: MonitorState) {
        self.states.lock().unwrap().push(state);
    }
}
