// Linux connection table from /proc/net/{tcp,tcp6,udp,udp6}, owners via /proc/<pid>/fd

use std::collections::HashMap;
use std::net::SocketAddr;

use procfs::net::{TcpState, UdpState};
use procfs::process::{FDTarget, all_processes};

use super::ProviderError;
use crate::models::{ConnectionStatus, Protocol, RawConnection};

pub(super) fn is_available() -> bool {
    std::path::Path::new("/proc/net/tcp").exists()
}

/// Reads every inet socket. Only a failure on the IPv4 TCP table is an error;
/// the other tables are optional (IPv6 may be disabled).
pub(super) fn read_connection_table() -> Result<Vec<RawConnection>, ProviderError> {
    let owners = socket_owners();
    let mut out = Vec::new();

    let tcp = procfs::net::tcp()?;
    let tcp6 = optional_table("tcp6", procfs::net::tcp6());
    for entry in tcp.into_iter().chain(tcp6) {
        out.push(RawConnection {
            protocol: Protocol::Tcp,
            local_addr: entry.local_address,
            remote_addr: peer(entry.remote_address),
            status: tcp_status(&entry.state),
            pid: owners.get(&entry.inode).copied(),
        });
    }

    let udp = optional_table("udp", procfs::net::udp());
    let udp6 = optional_table("udp6", procfs::net::udp6());
    for entry in udp.into_iter().chain(udp6) {
        out.push(RawConnection {
            protocol: Protocol::Udp,
            local_addr: entry.local_address,
            remote_addr: peer(entry.remote_address),
            status: udp_status(&entry.state),
            pid: owners.get(&entry.inode).copied(),
        });
    }

    Ok(out)
}

fn optional_table<T>(table: &'static str, result: procfs::ProcResult<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        tracing::debug!(error = %e, table, "skipping /proc/net table");
        Vec::new()
    })
}

/// Socket inode -> owning pid. Processes whose fds we may not read are skipped.
fn socket_owners() -> HashMap<u64, u32> {
    let mut owners = HashMap::new();
    let procs = match all_processes() {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(error = %e, "cannot enumerate processes; owners unresolved");
            return owners;
        }
    };
    for process in procs.flatten() {
        let Ok(fds) = process.fd() else {
            continue;
        };
        let pid = process.pid() as u32;
        for fd in fds.flatten() {
            if let FDTarget::Socket(inode) = fd.target {
                owners.insert(inode, pid);
            }
        }
    }
    owners
}

/// The kernel reports "no peer" as the unspecified address with port 0.
fn peer(addr: SocketAddr) -> Option<SocketAddr> {
    if addr.ip().is_unspecified() && addr.port() == 0 {
        None
    } else {
        Some(addr)
    }
}

fn tcp_status(state: &TcpState) -> ConnectionStatus {
    match state {
        TcpState::Established => ConnectionStatus::Established,
        TcpState::SynSent => ConnectionStatus::SynSent,
        TcpState::SynRecv | TcpState::NewSynRecv => ConnectionStatus::SynRecv,
        TcpState::FinWait1 => ConnectionStatus::FinWait1,
        TcpState::FinWait2 => ConnectionStatus::FinWait2,
        TcpState::TimeWait => ConnectionStatus::TimeWait,
        TcpState::Close => ConnectionStatus::Close,
        TcpState::CloseWait => ConnectionStatus::CloseWait,
        TcpState::LastAck => ConnectionStatus::LastAck,
        TcpState::Listen => ConnectionStatus::Listen,
        TcpState::Closing => ConnectionStatus::Closing,
    }
}

fn udp_status(state: &UdpState) -> ConnectionStatus {
    match state {
        UdpState::Established => ConnectionStatus::Established,
        UdpState::Close => ConnectionStatus::None,
    }
}
