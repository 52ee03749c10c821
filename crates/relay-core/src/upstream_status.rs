//! Shared upstream-connection status, read by the environment registry,
//! the upstream client, and the `/status` endpoint alike.

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpstreamState {
    Initializing,
    Valid,
    Interrupted,
    Off,
}

/// Snapshot of an environment's upstream connection, plus the timestamp of
/// the last state transition (used to derive the public `connected` /
/// `disconnected` status per the disconnected-status-time threshold).
#[derive(Debug, Clone)]
pub struct UpstreamStatus {
    pub state: UpstreamState,
    pub last_error: Option<String>,
    pub since: Instant,
}

impl UpstreamStatus {
    pub fn initializing() -> Self {
        Self {
            state: UpstreamState::Initializing,
            last_error: None,
            since: Instant::now(),
        }
    }

    pub fn transition(&mut self, state: UpstreamState, last_error: Option<String>) {
        if state != self.state {
            self.since = Instant::now();
        }
        self.state = state;
        self.last_error = last_error;
    }

    /// Public status per spec §4.3: connected if valid, or if non-valid for
    /// less than `disconnected_status_time`.
    pub fn is_connected(&self, disconnected_status_time: std::time::Duration) -> bool {
        match self.state {
            UpstreamState::Valid => true,
            _ => self.since.elapsed() < disconnected_status_time,
        }
    }
}
