//! `/sdk/goals/{envId}`: reverse-proxy passthrough to the upstream
//! dashboard's goals API. The upstream protocol itself is a non-goal
//! collaborator (spec §1); this forwards the request as-is and relays the
//! response back, the way `crates/server/src/dispatch.rs` forwards to a
//! provider upstream via `reqwest`.

use crate::AppState;
use crate::auth::{filter_from_query, resolve_env_by_id};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;

pub async fn goals_proxy(
    State(state): State<AppState>,
    Path(env_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = filter_from_query(&params);
    if let Err(e) = resolve_env_by_id(&state, &env_id, &filter) {
        return e.into_response();
    }

    let Some(base) = state.config.load().goals_base_url.clone() else {
        return (StatusCode::NOT_IMPLEMENTED, "goals passthrough not configured").into_response();
    };

    let url = format!("{}/sdk/goals/{}", base.trim_end_matches('/'), env_id);
    let client = reqwest::Client::new();
    match client.get(&url).send().await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/json")
                .to_string();
            match resp.bytes().await {
                Ok(bytes) => (status, [("content-type", content_type)], bytes).into_response(),
                Err(_) => StatusCode::BAD_GATEWAY.into_response(),
            }
        }
        Err(_) => StatusCode::BAD_GATEWAY.into_response(),
    }
}
