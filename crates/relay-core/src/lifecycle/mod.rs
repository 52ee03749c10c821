//! Application lifecycle management: readiness notification, signal
//! handling, daemonization, PID file management, and logging.

#[cfg(unix)]
pub mod daemon;
pub mod logging;
pub mod notify;
#[cfg(unix)]
pub mod pid_file;
pub mod signal;

/// Trait for lifecycle event notification (foreground vs systemd).
pub trait Lifecycle: Send + Sync {
    fn on_ready(&self);
    fn on_reloading(&self);
    fn on_reloaded(&self);
    fn on_stopping(&self);
}

/// Foreground lifecycle — logs events only.
pub struct ForegroundLifecycle;

impl Lifecycle for ForegroundLifecycle {
    fn on_ready(&self) {
        tracing::info!("relay ready");
    }

    fn on_reloading(&self) {
        tracing::info!("relay reloading configuration...");
    }

    fn on_reloaded(&self) {
        tracing::info!("relay configuration reloaded");
    }

    fn on_stopping(&self) {
        tracing::info!("relay stopping...");
    }
}

/// Systemd lifecycle — sends sd-notify messages and logs.
pub struct SystemdLifecycle;

impl Lifecycle for SystemdLifecycle {
    fn on_ready(&self) {
        notify::sd_ready();
        tracing::info!("relay ready (notified systemd)");
    }

    fn on_reloading(&self) {
        notify::sd_reloading();
        tracing::info!("relay reloading configuration (notified systemd)...");
    }

    fn on_reloaded(&self) {
        notify::sd_ready();
        tracing::info!("relay configuration reloaded (notified systemd)");
    }

    fn on_stopping(&self) {
        notify::sd_stopping();
        tracing::info!("relay stopping (notified systemd)...");
    }
}

/// Auto-detect the appropriate lifecycle implementation based on environment.
/// Returns `SystemdLifecycle` if `NOTIFY_SOCKET` is set, else `ForegroundLifecycle`.
pub fn detect_lifecycle() -> Box<dyn Lifecycle> {
    if std::env::var("NOTIFY_SOCKET").is_ok() {
        Box::new(SystemdLifecycle)
    } else {
        Box::new(ForegroundLifecycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_lifecycle_no_panic() {
        let lc = ForegroundLifecycle;
        lc.on_ready();
        lc.on_reloading();
        lc.on_reloaded();
        lc.on_stopping();
    }

    #[test]
    fn systemd_lifecycle_no_panic() {
        let lc = SystemdLifecycle;
        lc.on_ready();
        lc.on_reloading();
        lc.on_reloaded();
        lc.on_stopping();
    }
}
