//! SSE streaming endpoints for all three SDK kinds (spec §4.9). Delegates
//! fan-out to `relay_stream::StreamProvider`; this module only turns a
//! `Subscription` into an axum `Sse` response and keeps connection-count
//! metrics honest across early client disconnects, grounded on
//! `crates/server/src/streaming.rs::build_sse_response`.

use crate::AppState;
use crate::auth::{
    filter_from_query, mobile_credential, resolve_env_by_id, resolve_keyed_env, server_credential,
};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{Stream, unfold};
use relay_core::error::RelayError;
use relay_core::metrics::{ConnKind, Metrics};
use relay_registry::EnvironmentContext;
use relay_store::context::parse_context_base64;
use relay_stream::{StreamEvent, Subscription};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

/// Keeps a connection-count metric accurate regardless of how the stream
/// ends (client disconnect, kill, max-connection-time). Dropped exactly
/// once, whichever path the future takes.
struct ConnGuard {
    metrics: Arc<Metrics>,
    kind: ConnKind,
}

impl ConnGuard {
    fn new(metrics: Arc<Metrics>, kind: ConnKind) -> Self {
        metrics.conn_opened(kind);
        Self { metrics, kind }
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.metrics.conn_closed(self.kind);
    }
}

fn event_to_sse(event: StreamEvent) -> Event {
    Event::default().event(event.event).data(event.data.to_string())
}

fn sse_stream(
    subscription: Subscription,
    guard: ConnGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    unfold((subscription, guard), |(mut sub, guard)| async move {
        let event = sub.recv().await?;
        Some((Ok(event_to_sse(event)), (sub, guard)))
    })
}

fn build_response(
    provider: &relay_stream::StreamProvider,
    env_id: &str,
    credential: relay_core::credential::Credential,
    initial_event: StreamEvent,
    metrics: Arc<Metrics>,
    conn_kind: ConnKind,
) -> Response {
    let subscription = provider.subscribe(env_id, credential, initial_event);
    let guard = ConnGuard::new(metrics, conn_kind);
    Sse::new(sse_stream(subscription, guard))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text(""))
        .into_response()
}

fn full_put_event(ctx: &EnvironmentContext) -> StreamEvent {
    let snapshot = ctx.store().snapshot();
    StreamEvent::put(serde_json::json!({
        "flags": snapshot.flags,
        "segments": snapshot.segments,
    }))
}

fn flags_only_put_event(ctx: &EnvironmentContext) -> StreamEvent {
    let snapshot = ctx.store().snapshot();
    StreamEvent::put(serde_json::to_value(snapshot.flags).unwrap_or_default())
}

pub async fn server_all(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, credential) = match resolve_keyed_env(&state, server_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let initial = full_put_event(&ctx);
    build_response(
        &state.relay.streams().server_all,
        ctx.env_id(),
        credential,
        initial,
        state.metrics.clone(),
        ConnKind::Server,
    )
}

pub async fn server_flags(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, credential) = match resolve_keyed_env(&state, server_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let initial = flags_only_put_event(&ctx);
    build_response(
        &state.relay.streams().server_flags_only,
        ctx.env_id(),
        credential,
        initial,
        state.metrics.clone(),
        ConnKind::Server,
    )
}

pub async fn mobile_ping_report(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, credential) = match resolve_keyed_env(&state, mobile_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = relay_store::context::parse_context(&body) {
        return RelayError::MalformedContext(e).into_response();
    }
    build_response(
        &state.relay.streams().mobile_ping,
        ctx.env_id(),
        credential,
        StreamEvent::ping(),
        state.metrics.clone(),
        ConnKind::Mobile,
    )
}

pub async fn mobile_ping_get(
    State(state): State<AppState>,
    Path(data): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, credential) = match resolve_keyed_env(&state, mobile_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = parse_context_base64(&data) {
        return RelayError::MalformedContext(e).into_response();
    }
    build_response(
        &state.relay.streams().mobile_ping,
        ctx.env_id(),
        credential,
        StreamEvent::ping(),
        state.metrics.clone(),
        ConnKind::Mobile,
    )
}

pub async fn mobile_ping_no_context(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let filter = filter_from_query(&params);
    let (ctx, credential) = match resolve_keyed_env(&state, mobile_credential(&headers), &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    build_response(
        &state.relay.streams().mobile_ping,
        ctx.env_id(),
        credential,
        StreamEvent::ping(),
        state.metrics.clone(),
        ConnKind::Mobile,
    )
}

pub async fn js_ping_no_context(
    State(state): State<AppState>,
    Path(env_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = filter_from_query(&params);
    let ctx = match resolve_env_by_id(&state, &env_id, &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    build_response(
        &state.relay.streams().js_ping,
        ctx.env_id(),
        relay_core::credential::Credential::EnvId(env_id),
        StreamEvent::ping(),
        state.metrics.clone(),
        ConnKind::Browser,
    )
}

pub async fn js_ping_get(
    State(state): State<AppState>,
    Path((env_id, data)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = filter_from_query(&params);
    let ctx = match resolve_env_by_id(&state, &env_id, &filter) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = parse_context_base64(&data) {
        return RelayError::MalformedContext(e).into_response();
    }
    build_response(
        &state.relay.streams().js_ping,
        ctx.env_id(),
        relay_core::credential::Credential::EnvId(env_id),
        StreamEvent::ping(),
        state.metrics.clone(),
        ConnKind::Browser,
    )
}
