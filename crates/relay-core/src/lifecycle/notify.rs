//! Thin wrappers around sd-notify for the systemd readiness protocol.

pub fn sd_ready() {
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);
}

pub fn sd_reloading() {
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Reloading]);
}

pub fn sd_stopping() {
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
}
