// Domain models shared by the samplers, the controller and sinks

mod bandwidth;
mod connection;
mod state;

pub use bandwidth::{BYTES_PER_KB, BandwidthHistory, Counters, SamplePoint};
pub use connection::{
    ConnectionRecord, ConnectionSnapshot, ConnectionStatus, ProcessName, Protocol, RawConnection,
    UNKNOWN_PROCESS,
};
pub use state::MonitorState;

/// Current wall-clock time in milliseconds since the Unix epoch, 0 if the clock is before it.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}
