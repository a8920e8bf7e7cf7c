// Host metrics source: byte counters, connection table, pid -> name

#[cfg(target_os = "linux")]
mod linux;
mod host;

pub use host::SysinfoProvider;

use crate::models::{Counters, RawConnection};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("process {pid} not found")]
    NotFound { pid: u32 },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("metrics unavailable: {0}")]
    Unavailable(String),
    #[error("metrics provider panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(target_os = "linux")]
impl From<procfs::ProcError> for ProviderError {
    fn from(e: procfs::ProcError) -> Self {
        match e {
            procfs::ProcError::PermissionDenied(path) => ProviderError::PermissionDenied(
                path.map(|p| p.display().to_string()).unwrap_or_default(),
            ),
            procfs::ProcError::Io(err, _) => ProviderError::Io(err),
            other => ProviderError::Unavailable(other.to_string()),
        }
    }
}

/// Source of raw host network metrics.
///
/// Calls block on the OS and may take a while on busy hosts; samplers run
/// them on the blocking pool.
pub trait MetricsProvider: Send + Sync {
    /// Backend name for logs (e.g. "sysinfo").
    fn name(&self) -> &'static str;

    /// Cumulative bytes sent/received across all interfaces.
    fn read_counters(&self) -> Result<Counters, ProviderError>;

    /// Every inet (TCP/UDP, v4/v6) socket currently known to the kernel.
    fn list_connections(&self) -> Result<Vec<RawConnection>, ProviderError>;

    /// Name of process `pid`. `ProviderError::NotFound` once it has exited.
    fn process_name(&self, pid: u32) -> Result<String, ProviderError>;
}
