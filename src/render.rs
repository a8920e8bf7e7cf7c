// Text views of bandwidth history and connection snapshots for terminal output

use std::fmt;
use std::net::SocketAddr;

use crate::models::{BandwidthHistory, ConnectionSnapshot, MonitorState};
use crate::version;

const RULE_WIDTH: usize = 70;

/// Connection listing: protocol tally, remote hosts, recent connections.
pub struct ConnectionPanel<'a> {
    snapshot: &'a ConnectionSnapshot,
    max_hosts: usize,
}

/// Shows at most `max_hosts` remote IPs (sorted) before collapsing the rest.
pub fn connection_panel(snapshot: &ConnectionSnapshot, max_hosts: usize) -> ConnectionPanel<'_> {
    ConnectionPanel {
        snapshot,
        max_hosts,
    }
}

impl fmt::Display for ConnectionPanel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot;
        let heavy = "═".repeat(RULE_WIDTH);
        writeln!(f, "{heavy}")?;
        writeln!(f, "  NETWORK CONNECTIONS")?;
        writeln!(f, "{heavy}")?;
        writeln!(f)?;

        writeln!(f, "ACTIVE PROTOCOLS:")?;
        if s.protocol_counts.is_empty() {
            writeln!(f, "   (none)")?;
        }
        for (protocol, count) in &s.protocol_counts {
            let noun = if *count == 1 { "connection" } else { "connections" };
            writeln!(f, "   * {protocol}: {count} {noun}")?;
        }
        writeln!(f)?;

        let hosts = s.distinct_remote_hosts.len();
        writeln!(f, "CONNECTED HOSTS ({hosts} IP):")?;
        for ip in s.distinct_remote_hosts.iter().take(self.max_hosts) {
            writeln!(f, "   * {ip}")?;
        }
        if hosts > self.max_hosts {
            writeln!(f, "   ... and {} more", hosts - self.max_hosts)?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "ACTIVE CONNECTIONS (latest {}):",
            s.recent_connections.len()
        )?;
        writeln!(f, "{}", "─".repeat(RULE_WIDTH))?;
        for (i, conn) in s.recent_connections.iter().enumerate() {
            let remote = SocketAddr::new(conn.remote_ip, conn.remote_port);
            writeln!(f, "{}. [{}] {}", i + 1, conn.protocol, conn.process_name)?;
            writeln!(f, "   Local: :{} -> Remote: {remote}", conn.local_port)?;
            writeln!(f, "   Status: {}", conn.status)?;
        }
        Ok(())
    }
}

/// One-line summary of the newest bandwidth sample.
pub struct BandwidthLine<'a>(&'a BandwidthHistory);

pub fn bandwidth_line(history: &BandwidthHistory) -> BandwidthLine<'_> {
    BandwidthLine(history)
}

impl fmt::Display for BandwidthLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.latest() {
            Some(p) => write!(
                f,
                "upload {:.2} KB | download {:.2} KB ({} samples)",
                p.upload_kbps,
                p.download_kbps,
                self.0.len()
            ),
            None => f.write_str("no bandwidth samples yet"),
        }
    }
}

/// Status bar text, e.g. "MONITORING ACTIVE | netpulse 0.1.0".
pub fn status_line(state: MonitorState) -> String {
    format!("{state} | {}", version::banner())
}
