//! `/status`: per-environment report plus an overall healthy/degraded
//! verdict (spec §4.9, §6).

use crate::AppState;
use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use relay_core::credential::Credential;
use relay_store::InitStatus;

/// Replaces every character but the last four with `*` (spec §4.9).
fn obscure(value: &str) -> String {
    let len = value.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let keep_from = len - 4;
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i < keep_from { '*' } else { c })
        .collect()
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let disconnected_status_time = state.config.load().disconnected_status_time_secs;
    let disconnected_status_time = std::time::Duration::from_secs(disconnected_status_time);

    let environments: Vec<serde_json::Value> = state
        .relay
        .registry()
        .list()
        .iter()
        .map(|ctx| {
            let upstream = ctx.upstream_status();
            let sdk_key = ctx
                .get_credentials()
                .into_iter()
                .find_map(|c| match c {
                    Credential::ServerKey(v) => Some(obscure(&v)),
                    _ => None,
                });
            let mobile_key = ctx
                .get_credentials()
                .into_iter()
                .find_map(|c| match c {
                    Credential::MobileKey(v) => Some(obscure(&v)),
                    _ => None,
                });
            serde_json::json!({
                "envId": ctx.env_id(),
                "displayName": ctx.identifiers().display_name(),
                "sdkKey": sdk_key,
                "mobileKey": mobile_key,
                "state": format!("{:?}", upstream.state),
                "stateSinceMs": upstream.since.elapsed().as_millis(),
                "lastError": upstream.last_error,
                "dataStoreStatus": match ctx.store().status() {
                    InitStatus::Initialized => "valid",
                    InitStatus::Uninitialized => "uninitialized",
                },
                "connected": ctx.is_connected(disconnected_status_time),
            })
        })
        .collect();

    let healthy = state.relay.is_healthy();

    Json(serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "fullyConfigured": state.relay.is_fully_configured(),
        "environments": environments,
        "clientVersion": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.start_time.elapsed().as_secs(),
    }))
}

#[cfg(test)]
mod tests {
    use super::obscure;

    #[test]
    fn obscures_all_but_last_four() {
        assert_eq!(obscure("sdk-1234567890"), "**********7890");
    }

    #[test]
    fn short_value_is_fully_obscured() {
        assert_eq!(obscure("abc"), "***");
    }
}
