// Presentation sinks: where samplers push their results

use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::{BandwidthHistory, ConnectionSnapshot, MonitorState, SamplePoint};
use crate::render;

/// Consumer of sampler output, registered when the monitor is built.
///
/// Called from the sampler task that produced the update, so implementations
/// must return quickly; copy the data and redraw elsewhere if rendering is slow.
/// Bandwidth and connection updates may arrive interleaved in any order.
pub trait PresentationSink: Send + Sync {
    fn on_bandwidth_update(&self, history: &BandwidthHistory);

    fn on_connection_update(&self, snapshot: &ConnectionSnapshot);

    /// Called once per real lifecycle transition (not for no-op start/stop).
    fn on_state_change(&self, _state: MonitorState) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ConsoleEvent<'a> {
    Bandwidth {
        latest: Option<&'a SamplePoint>,
        samples: usize,
    },
    Connections {
        snapshot: &'a ConnectionSnapshot,
    },
    State {
        state: MonitorState,
        label: String,
    },
}

/// Frames queued for the writer thread before new ones are dropped.
const OUTPUT_QUEUE: usize = 32;

/// Writes updates to stdout. Text mode redraws the connection panel each
/// connection tick (with the latest bandwidth figure); JSON mode emits one
/// object per update.
///
/// Frames are rendered on the calling sampler task and handed to a writer
/// thread, so a slow or blocked terminal never stalls sampling. When the queue
/// is full the frame is dropped and counted.
pub struct ConsoleSink {
    format: OutputFormat,
    max_remote_hosts: usize,
    /// Rendered line of the newest bandwidth sample.
    last_bandwidth: Mutex<Option<String>>,
    out_tx: mpsc::Sender<String>,
    dropped: AtomicU64,
}

impl ConsoleSink {
    pub fn new(format: OutputFormat, max_remote_hosts: usize) -> Self {
        Self::with_writer(format, max_remote_hosts, std::io::stdout())
    }

    /// Same as `new` but writes to `out`. The writer thread ends once the
    /// sink is dropped and the queue is drained.
    pub fn with_writer<W>(format: OutputFormat, max_remote_hosts: usize, out: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel(OUTPUT_QUEUE);
        std::thread::spawn(move || write_frames(out_rx, out));
        Self {
            format,
            max_remote_hosts,
            last_bandwidth: Mutex::new(None),
            out_tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Frames discarded because the writer fell behind or is gone.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn emit_json(&self, event: &ConsoleEvent<'_>) {
        match serde_json::to_string(event) {
            Ok(line) => self.write_out(&line),
            Err(e) => tracing::warn!(error = %e, operation = "encode_event", "console sink encode failed"),
        }
    }

    fn write_out(&self, text: &str) {
        if let Err(e) = self.out_tx.try_send(text.to_string()) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(error = %e, dropped, "console output dropped");
        }
    }
}

fn write_frames<W: Write>(mut rx: mpsc::Receiver<String>, mut out: W) {
    while let Some(frame) = rx.blocking_recv() {
        if let Err(e) = writeln!(out, "{frame}").and_then(|_| out.flush()) {
            tracing::debug!(error = %e, "console sink write failed");
        }
    }
    tracing::debug!("console writer finished");
}

impl PresentationSink for ConsoleSink {
    fn on_bandwidth_update(&self, history: &BandwidthHistory) {
        match self.format {
            OutputFormat::Json => self.emit_json(&ConsoleEvent::Bandwidth {
                latest: history.latest(),
                samples: history.len(),
            }),
            OutputFormat::Text => {
                let line = render::bandwidth_line(history).to_string();
                tracing::trace!(bandwidth = %line, "bandwidth update");
                if let Ok(mut last) = self.last_bandwidth.lock() {
                    *last = Some(line);
                }
            }
        }
    }

    fn on_connection_update(&self, snapshot: &ConnectionSnapshot) {
        match self.format {
            OutputFormat::Json => self.emit_json(&ConsoleEvent::Connections { snapshot }),
            OutputFormat::Text => {
                let bandwidth = self
                    .last_bandwidth
                    .lock()
                    .ok()
                    .and_then(|last| last.clone())
                    .unwrap_or_else(|| "no bandwidth samples yet".into());
                let panel = render::connection_panel(snapshot, self.max_remote_hosts);
                self.write_out(&format!("{panel}\nBANDWIDTH: {bandwidth}\n"));
            }
        }
    }

    fn on_state_change(&self, state: MonitorState) {
        match self.format {
            OutputFormat::Json => self.emit_json(&ConsoleEvent::State {
                state,
                label: state.to_string(),
            }),
            OutputFormat::Text => self.write_out(&render::status_line(state)),
        }
    }
}
