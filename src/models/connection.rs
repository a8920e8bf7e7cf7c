// Connection table entries and the per-tick aggregate view

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Placeholder shown when a connection's owning process can't be resolved.
pub const UNKNOWN_PROCESS: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// Socket state as reported by the kernel. `None` covers sockets with no
/// state machine (unconnected UDP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    None,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Established => "ESTABLISHED",
            ConnectionStatus::SynSent => "SYN_SENT",
            ConnectionStatus::SynRecv => "SYN_RECV",
            ConnectionStatus::FinWait1 => "FIN_WAIT1",
            ConnectionStatus::FinWait2 => "FIN_WAIT2",
            ConnectionStatus::TimeWait => "TIME_WAIT",
            ConnectionStatus::Close => "CLOSE",
            ConnectionStatus::CloseWait => "CLOSE_WAIT",
            ConnectionStatus::LastAck => "LAST_ACK",
            ConnectionStatus::Listen => "LISTEN",
            ConnectionStatus::Closing => "CLOSING",
            ConnectionStatus::None => "NONE",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the host's inet connection table, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConnection {
    pub protocol: Protocol,
    pub local_addr: SocketAddr,
    /// `None` when the socket has no peer (listening or unconnected).
    pub remote_addr: Option<SocketAddr>,
    pub status: ConnectionStatus,
    pub pid: Option<u32>,
}

/// Outcome of resolving a pid to a process name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ProcessName {
    Known(String),
    Unknown,
}

impl ProcessName {
    pub fn as_str(&self) -> &str {
        match self {
            ProcessName::Known(name) => name,
            ProcessName::Unknown => UNKNOWN_PROCESS,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, ProcessName::Known(_))
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ProcessName> for String {
    fn from(name: ProcessName) -> Self {
        match name {
            ProcessName::Known(name) => name,
            ProcessName::Unknown => UNKNOWN_PROCESS.to_string(),
        }
    }
}

impl From<String> for ProcessName {
    fn from(s: String) -> Self {
        if s.is_empty() || s == UNKNOWN_PROCESS {
            ProcessName::Unknown
        } else {
            ProcessName::Known(s)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub protocol: Protocol,
    pub local_port: u16,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub process_name: ProcessName,
    pub status: ConnectionStatus,
}

/// Aggregate view of one connection tick. Replaced wholesale every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub protocol_counts: BTreeMap<Protocol, usize>,
    pub distinct_remote_hosts: BTreeSet<IpAddr>,
    pub recent_connections: Vec<ConnectionRecord>,
    /// Milliseconds since the Unix epoch; 0 for the initial empty snapshot.
    pub timestamp: u64,
}

impl ConnectionSnapshot {
    /// Number of connections that passed the filter (sum of the tally).
    pub fn total_connections(&self) -> usize {
        self.protocol_counts.values().sum()
    }

    pub fn count(&self, protocol: Protocol) -> usize {
        self.protocol_counts.get(&protocol).copied().unwrap_or(0)
    }
}
