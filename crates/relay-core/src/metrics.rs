//! Lightweight in-memory metrics using atomic counters (spec §9: "treat as
//! a collaborator exposing counters").

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// The counters spec §9 names explicitly, plus a creation timestamp for
/// uptime reporting.
pub struct Metrics {
    pub server_requests: AtomicU64,
    pub mobile_requests: AtomicU64,
    pub browser_requests: AtomicU64,
    /// Current open streaming connections, per SDK kind (can go up/down).
    pub server_conns: AtomicI64,
    pub mobile_conns: AtomicI64,
    pub browser_conns: AtomicI64,
    created_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            server_requests: AtomicU64::new(0),
            mobile_requests: AtomicU64::new(0),
            browser_requests: AtomicU64::new(0),
            server_conns: AtomicI64::new(0),
            mobile_conns: AtomicI64::new(0),
            browser_conns: AtomicI64::new(0),
            created_at: Instant::now(),
        }
    }

    pub fn record_server_request(&self) {
        self.server_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mobile_request(&self) {
        self.mobile_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_browser_request(&self) {
        self.browser_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn conn_opened(&self, kind: ConnKind) {
        self.conn_counter(kind).fetch_add(1, Ordering::Relaxed);
    }

    pub fn conn_closed(&self, kind: ConnKind) {
        self.conn_counter(kind).fetch_sub(1, Ordering::Relaxed);
    }

    fn conn_counter(&self, kind: ConnKind) -> &AtomicI64 {
        match kind {
            ConnKind::Server => &self.server_conns,
            ConnKind::Mobile => &self.mobile_conns,
            ConnKind::Browser => &self.browser_conns,
        }
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "server_requests": self.server_requests.load(Ordering::Relaxed),
            "mobile_requests": self.mobile_requests.load(Ordering::Relaxed),
            "browser_requests": self.browser_requests.load(Ordering::Relaxed),
            "server_conns": self.server_conns.load(Ordering::Relaxed),
            "mobile_conns": self.mobile_conns.load(Ordering::Relaxed),
            "browser_conns": self.browser_conns.load(Ordering::Relaxed),
            "uptime_seconds": self.created_at.elapsed().as_secs(),
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnKind {
    Server,
    Mobile,
    Browser,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_requests_and_conns() {
        let m = Metrics::new();
        m.record_server_request();
        m.record_mobile_request();
        m.record_mobile_request();
        m.conn_opened(ConnKind::Browser);
        m.conn_opened(ConnKind::Browser);
        m.conn_closed(ConnKind::Browser);

        let snap = m.snapshot();
        assert_eq!(snap["server_requests"], 1);
        assert_eq!(snap["mobile_requests"], 2);
        assert_eq!(snap["browser_conns"], 1);
    }
}
