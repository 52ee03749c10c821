//! Flag evaluation endpoints: full-schema (`evalx`) responses for server,
//! mobile, and JS SDK kinds (spec §4.9). Context decoding and secure-mode
//! hashing live here; the targeting algorithm itself is `relay_store`'s
//! `Evaluator` collaborator.

use crate::AppState;
use crate::auth::{
    SdkKind, filter_from_query, mobile_credential, resolve_env_by_id, resolve_keyed_env,
    server_credential,
};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use relay_core::error::RelayError;
use relay_registry::EnvironmentContext;
use relay_store::context::{EvalContext, parse_context, parse_context_base64};
use relay_store::{Evaluator, FlagRep};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

fn with_reasons(params: &HashMap<String, String>) -> bool {
    params.get("withReasons").map(|v| v == "true").unwrap_or(false)
}

fn visible(flag: &FlagRep, kind: SdkKind) -> bool {
    match kind {
        SdkKind::Server => true,
        SdkKind::Mobile => flag.client_side_availability.using_mobile_key,
        SdkKind::Js => flag.client_side_availability.using_environment_id,
    }
}

fn secure_mode_hash(server_key: &str, context_key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(server_key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(context_key.as_bytes());
    let bytes = mac.finalize().into_bytes();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn check_secure_mode(
    ctx: &EnvironmentContext,
    eval_ctx: &EvalContext,
    params: &HashMap<String, String>,
) -> Result<(), RelayError> {
    if !ctx.secure_mode() {
        return Ok(());
    }
    let Some(server_key) = ctx
        .get_credentials()
        .into_iter()
        .find_map(|c| match c {
            relay_core::credential::Credential::ServerKey(v) => Some(v),
            _ => None,
        })
    else {
        return Err(RelayError::SecureModeHashMismatch);
    };
    let Some(context_key) = &eval_ctx.key else {
        return Err(RelayError::SecureModeHashMismatch);
    };
    let expected = secure_mode_hash(&server_key, context_key);
    let provided = params.get("h").map(String::as_str).unwrap_or_default();
    if provided == expected {
        Ok(())
    } else {
        Err(RelayError::SecureModeHashMismatch)
    }
}

fn evalx_body(
    ctx: &EnvironmentContext,
    evaluator: &Arc<dyn Evaluator>,
    eval_ctx: &EvalContext,
    kind: SdkKind,
    reasons: bool,
) -> serde_json::Value {
    let snapshot = ctx.store().snapshot();
    let map: serde_json::Map<String, serde_json::Value> = snapshot
        .flags
        .values()
        .filter(|f| visible(f, kind))
        .map(|flag| {
            let result = evaluator.evaluate(flag, eval_ctx);
            let mut entry = serde_json::json!({
                "value": result.value,
                "variation": result.variation,
                "version": flag.version,
            });
            if flag.track_events {
                entry["trackEvents"] = serde_json::Value::Bool(true);
            }
            if let Some(until) = flag.debug_events_until_date {
                entry["debugEventsUntilDate"] = serde_json::Value::from(until);
            }
            if reasons || flag.is_experiment {
                entry["reason"] = serde_json::to_value(&result.reason).unwrap_or_default();
                if flag.is_experiment {
                    entry["trackReason"] = serde_json::Value::Bool(true);
                }
            }
            (flag.key.clone(), entry)
        })
        .collect();
    serde_json::Value::Object(map)
}

fn decode_report_context(headers: &HeaderMap, body: &[u8]) -> Result<EvalContext, RelayError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("application/json") {
        return Err(RelayError::UnsupportedMediaType);
    }
    parse_context(body).map_err(RelayError::MalformedContext)
}

pub async fn server_evalx_report(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, _) = match resolve_keyed_env(&state, server_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let eval_ctx = match decode_report_context(&headers, &body) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };
    let body = evalx_body(&ctx, &state.evaluator, &eval_ctx, SdkKind::Server, with_reasons(&params));
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub async fn server_evalx_get(
    State(state): State<AppState>,
    Path(data): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, _) = match resolve_keyed_env(&state, server_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let eval_ctx = match parse_context_base64(&data) {
        Ok(c) => c,
        Err(e) => return RelayError::MalformedContext(e).into_response(),
    };
    let body = evalx_body(&ctx, &state.evaluator, &eval_ctx, SdkKind::Server, with_reasons(&params));
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub async fn mobile_evalx_report(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, _) = match resolve_keyed_env(&state, mobile_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let eval_ctx = match decode_report_context(&headers, &body) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };
    let body = evalx_body(&ctx, &state.evaluator, &eval_ctx, SdkKind::Mobile, with_reasons(&params));
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub async fn mobile_evalx_get(
    State(state): State<AppState>,
    Path(data): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, _) = match resolve_keyed_env(&state, mobile_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let eval_ctx = match parse_context_base64(&data) {
        Ok(c) => c,
        Err(e) => return RelayError::MalformedContext(e).into_response(),
    };
    let body = evalx_body(&ctx, &state.evaluator, &eval_ctx, SdkKind::Mobile, with_reasons(&params));
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub async fn js_evalx_report(
    State(state): State<AppState>,
    Path(env_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let filter = filter_from_query(&params);
    let ctx = match resolve_env_by_id(&state, &env_id, &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let eval_ctx = match decode_report_context(&headers, &body) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = check_secure_mode(&ctx, &eval_ctx, &params) {
        return e.into_response();
    }
    let body = evalx_body(&ctx, &state.evaluator, &eval_ctx, SdkKind::Js, with_reasons(&params));
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub async fn js_evalx_get(
    State(state): State<AppState>,
    Path((env_id, data)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = filter_from_query(&params);
    let ctx = match resolve_env_by_id(&state, &env_id, &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let eval_ctx = match parse_context_base64(&data) {
        Ok(c) => c,
        Err(e) => return RelayError::MalformedContext(e).into_response(),
    };
    if let Err(e) = check_secure_mode(&ctx, &eval_ctx, &params) {
        return e.into_response();
    }
    let body = evalx_body(&ctx, &state.evaluator, &eval_ctx, SdkKind::Js, with_reasons(&params));
    (StatusCode::OK, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::ClientSideAvailability;

    #[test]
    fn visible_filters_by_sdk_kind() {
        let mut flag = FlagRep {
            key: "f".into(),
            version: 1,
            value: serde_json::json!(true),
            variation: 0,
            track_events: false,
            is_experiment: false,
            debug_events_until_date: None,
            client_side_availability: ClientSideAvailability::default(),
        };
        assert!(visible(&flag, SdkKind::Server));
        assert!(!visible(&flag, SdkKind::Js));
        flag.client_side_availability.using_environment_id = true;
        assert!(visible(&flag, SdkKind::Js));
        assert!(!visible(&flag, SdkKind::Mobile));
    }

    #[test]
    fn secure_mode_hash_is_deterministic() {
        let a = secure_mode_hash("sdk-key", "user-1");
        let b = secure_mode_hash("sdk-key", "user-1");
        assert_eq!(a, b);
        assert_ne!(a, secure_mode_hash("sdk-key", "user-2"));
    }
}
