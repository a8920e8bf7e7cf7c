// Bandwidth samples and the bounded history fed to charts

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bytes per KB used when converting counter deltas.
pub const BYTES_PER_KB: f64 = 1024.0;

/// One bandwidth observation. Rates are KB per sample, not per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePoint {
    pub upload_kbps: f64,
    pub download_kbps: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Cumulative byte counters as read from the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// Rolling window of the most recent samples, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthHistory {
    capacity: usize,
    points: VecDeque<SamplePoint>,
}

impl BandwidthHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Appends `point`, evicting from the front once over capacity.
    /// A timestamp older than the newest entry is raised to it so the
    /// sequence never goes backwards across a wall-clock step.
    pub fn push(&mut self, mut point: SamplePoint) {
        if let Some(last) = self.points.back() {
            point.timestamp = point.timestamp.max(last.timestamp);
        }
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&SamplePoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SamplePoint> {
        self.points.iter()
    }

    /// Upload series in chronological order (chart x-axis = index).
    pub fn upload_series(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.upload_kbps).collect()
    }

    pub fn download_series(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.download_kbps).collect()
    }
}
