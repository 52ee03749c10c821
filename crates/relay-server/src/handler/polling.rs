//! PHP-style polling endpoints: full flag map, single flag, single segment
//! (spec §4.9). ETag-based caching and TTL-driven `Expires`/`Vary` headers.

use crate::AppState;
use crate::auth::{filter_from_query, resolve_keyed_env, server_credential};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use relay_core::error::RelayError;
use sha1::{Digest, Sha1};
use std::collections::HashMap;

fn map_etag(items: &[(String, u64)]) -> String {
    let mut sorted: Vec<&(String, u64)> = items.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut hasher = Sha1::new();
    for (key, version) in sorted {
        hasher.update(format!("{key}:{version}"));
    }
    let digest = hasher.finalize();
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    format!("relay-{}", &hex[..15.min(hex.len())])
}

fn item_etag(version: u64) -> String {
    format!("relay-{version}")
}

fn not_modified(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_matches('"') == etag)
}

fn http_date(when: std::time::SystemTime) -> String {
    let dt: chrono::DateTime<chrono::Utc> = when.into();
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub async fn all_flags(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, _credential) = match resolve_keyed_env(&state, server_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    let snapshot = ctx.store().snapshot();
    let etag = map_etag(
        &snapshot
            .flags
            .values()
            .map(|f| (f.key.clone(), f.version))
            .collect::<Vec<_>>(),
    );

    if not_modified(&headers, &etag) {
        return (StatusCode::NOT_MODIFIED, cache_headers(&etag, ctx.ttl_secs())).into_response();
    }

    let body: serde_json::Map<String, serde_json::Value> = snapshot
        .flags
        .into_iter()
        .map(|(k, f)| (k, serde_json::to_value(&f).unwrap_or(serde_json::Value::Null)))
        .collect();

    (
        StatusCode::OK,
        cache_headers(&etag, ctx.ttl_secs()),
        axum::Json(serde_json::Value::Object(body)),
    )
        .into_response()
}

pub async fn one_flag(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, _credential) = match resolve_keyed_env(&state, server_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    let Some(flag) = ctx.store().get_flag(&key) else {
        return RelayError::NotFound(format!("no such flag: {key}")).into_response();
    };
    let etag = item_etag(flag.version);

    if not_modified(&headers, &etag) {
        return (StatusCode::NOT_MODIFIED, cache_headers(&etag, ctx.ttl_secs())).into_response();
    }

    (
        StatusCode::OK,
        cache_headers(&etag, ctx.ttl_secs()),
        axum::Json(flag),
    )
        .into_response()
}

pub async fn one_segment(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, _credential) = match resolve_keyed_env(&state, server_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    let Some(segment) = ctx.store().get_segment(&key) else {
        return RelayError::NotFound(format!("no such segment: {key}")).into_response();
    };
    let etag = item_etag(segment.version);

    if not_modified(&headers, &etag) {
        return (StatusCode::NOT_MODIFIED, cache_headers(&etag, ctx.ttl_secs())).into_response();
    }

    (
        StatusCode::OK,
        cache_headers(&etag, ctx.ttl_secs()),
        axum::Json(segment),
    )
        .into_response()
}

fn cache_headers(etag: &str, ttl_secs: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(v) = header::HeaderValue::from_str(&format!("\"{etag}\"")) {
        headers.insert(header::ETAG, v);
    }
    if ttl_secs > 0 {
        let expires = std::time::SystemTime::now() + std::time::Duration::from_secs(ttl_secs);
        if let Ok(v) = header::HeaderValue::from_str(&http_date(expires)) {
            headers.insert(header::EXPIRES, v);
        }
        headers.insert(header::VARY, header::HeaderValue::from_static("Authorization"));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_etag_is_order_independent() {
        let a = map_etag(&[("b".into(), 2), ("a".into(), 1)]);
        let b = map_etag(&[("a".into(), 1), ("b".into(), 2)]);
        assert_eq!(a, b);
        assert!(a.starts_with("relay-"));
    }

    #[test]
    fn item_etag_uses_version() {
        assert_eq!(item_etag(7), "relay-7");
    }

    #[test]
    fn not_modified_matches_the_quoted_form_the_server_sent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, "\"relay-7\"".parse().unwrap());
        assert!(not_modified(&headers, "relay-7"));
    }
}
