// Monitor lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    #[default]
    Stopped,
    Running,
}

impl MonitorState {
    pub fn is_running(&self) -> bool {
        matches!(self, MonitorState::Running)
    }
}

/// Status-bar label.
impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Stopped => f.write_str("READY"),
            MonitorState::Running => f.write_str("MONITORING ACTIVE"),
        }
    }
}
