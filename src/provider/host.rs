// Metrics provider backed by sysinfo (counters, process names) and procfs (sockets)

use std::sync::Mutex;

use sysinfo::{Networks, Pid, ProcessesToUpdate, System};
use tracing::instrument;

use super::{MetricsProvider, ProviderError};
use crate::models::{Counters, RawConnection};

pub struct SysinfoProvider {
    networks: Mutex<Networks>,
    sys: Mutex<System>,
}

impl SysinfoProvider {
    /// Fails when the host can't list sockets at all, so the caller learns
    /// about it at startup rather than on every tick.
    pub fn new() -> Result<Self, ProviderError> {
        #[cfg(target_os = "linux")]
        if !super::linux::is_available() {
            return Err(ProviderError::Unavailable(
                "procfs not available (is /proc mounted?)".into(),
            ));
        }
        Ok(Self {
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            sys: Mutex::new(System::new()),
        })
    }
}

impl MetricsProvider for SysinfoProvider {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    #[instrument(skip(self), fields(provider = "sysinfo", operation = "read_counters"))]
    fn read_counters(&self) -> Result<Counters, ProviderError> {
        let mut networks = self
            .networks
            .lock()
            .map_err(|e| ProviderError::Unavailable(format!("networks lock poisoned: {e}")))?;
        networks.refresh(true);
        let counters = networks
            .list()
            .values()
            .fold(Counters::default(), |acc, data| Counters {
                bytes_sent: acc.bytes_sent.saturating_add(data.total_transmitted()),
                bytes_recv: acc.bytes_recv.saturating_add(data.total_received()),
            });
        Ok(counters)
    }

    #[instrument(skip(self), fields(provider = "sysinfo", operation = "list_connections"))]
    fn list_connections(&self) -> Result<Vec<RawConnection>, ProviderError> {
        #[cfg(target_os = "linux")]
        {
            super::linux::read_connection_table()
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(ProviderError::Unavailable(
                "connection table is only read from /proc on Linux".into(),
            ))
        }
    }

    fn process_name(&self, pid: u32) -> Result<String, ProviderError> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|e| ProviderError::Unavailable(format!("sysinfo lock poisoned: {e}")))?;
        let sys_pid = Pid::from_u32(pid);
        sys.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
        sys.process(sys_pid)
            .map(|p| p.name().to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .ok_or(ProviderError::NotFound { pid })
    }
}
