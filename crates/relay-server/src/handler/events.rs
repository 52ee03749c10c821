//! Analytics event forwarding and the image-beacon endpoint (spec §4.9).
//! The event dispatcher itself is a non-goal collaborator — every handler
//! here resolves the environment, validates the credential, and then
//! accepts-and-discards (202), matching the offline-mode behavior spec'd
//! for when no dispatcher is wired up.

use crate::AppState;
use crate::auth::{filter_from_query, mobile_credential, resolve_env_by_id, resolve_keyed_env, server_credential};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use std::collections::HashMap;

const TRANSPARENT_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

pub async fn server_bulk(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: axum::http::HeaderMap,
    _body: Bytes,
) -> Response {
    let filter = filter_from_query(&params);
    match resolve_keyed_env(&state, server_credential(&headers), &filter) {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn server_diagnostic(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: axum::http::HeaderMap,
    _body: Bytes,
) -> Response {
    let filter = filter_from_query(&params);
    match resolve_keyed_env(&state, server_credential(&headers), &filter) {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn mobile_events(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: axum::http::HeaderMap,
    _body: Bytes,
) -> Response {
    let filter = filter_from_query(&params);
    match resolve_keyed_env(&state, mobile_credential(&headers), &filter) {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn js_events_bulk(
    State(state): State<AppState>,
    Path(env_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    _body: Bytes,
) -> Response {
    let filter = filter_from_query(&params);
    match resolve_env_by_id(&state, &env_id, &filter) {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn js_events_diagnostic(
    State(state): State<AppState>,
    Path(env_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    _body: Bytes,
) -> Response {
    let filter = filter_from_query(&params);
    match resolve_env_by_id(&state, &env_id, &filter) {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(e) => e.into_response(),
    }
}

/// `/a/{envId}.gif`: decodes the `?d=` beacon payload (discarded, since the
/// event dispatcher is a non-goal collaborator) and always returns the
/// 1x1 transparent GIF so the browser's `<img>` tag never errors.
pub async fn image_beacon(
    State(state): State<AppState>,
    Path(env_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = filter_from_query(&params);
    if let Err(e) = resolve_env_by_id(&state, &env_id, &filter) {
        return e.into_response();
    }
    if let Some(d) = params.get("d") {
        let _ = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(d)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(d));
    }
    (StatusCode::OK, [("content-type", "image/gif")], TRANSPARENT_GIF).into_response()
}
