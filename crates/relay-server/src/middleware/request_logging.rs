use crate::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use relay_core::metrics::ConnKind;
use relay_core::request_context::RequestContext;

/// Maps a route's registered pattern to the SDK-kind request counter it
/// belongs to. `None` for public/unclassified routes (health, metrics,
/// status), which aren't counted per spec §9.
fn classify_route(pattern: &str) -> Option<ConnKind> {
    match pattern {
        "/all"
        | "/flags"
        | "/bulk"
        | "/diagnostic"
        | "/sdk/flags"
        | "/sdk/flags/{key}"
        | "/sdk/segments/{key}"
        | "/sdk/evalx/context"
        | "/sdk/evalx/user"
        | "/sdk/evalx/contexts/{data}"
        | "/sdk/evalx/users/{data}"
        | "/sdk/goals/{env_id}" => Some(ConnKind::Server),

        "/msdk/evalx/context"
        | "/msdk/evalx/contexts/{data}"
        | "/meval"
        | "/meval/{data}"
        | "/mping"
        | "/mobile/events/bulk"
        | "/mobile/events/diagnostic"
        | "/mobile/events"
        | "/mobile" => Some(ConnKind::Mobile),

        "/sdk/evalx/{env_id}/contexts/{data}"
        | "/sdk/evalx/{env_id}/context"
        | "/eval/{env_id}"
        | "/eval/{env_id}/{data}"
        | "/ping/{env_id}"
        | "/events/bulk/{env_id}"
        | "/events/diagnostic/{env_id}"
        | "/a/{env_id}.gif" => Some(ConnKind::Browser),

        _ => None,
    }
}

fn record_request(state: &AppState, kind: ConnKind) {
    match kind {
        ConnKind::Server => state.metrics.record_server_request(),
        ConnKind::Mobile => state.metrics.record_mobile_request(),
        ConnKind::Browser => state.metrics.record_browser_request(),
    }
}

/// Logs request/response pairs with request-context metadata, and bumps the
/// matching per-SDK-kind request counter (spec §9).
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    matched_path: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    if let Some(kind) = matched_path.as_ref().and_then(|p| classify_route(p.as_str())) {
        record_request(&state, kind);
    }

    let ctx = request.extensions().get::<RequestContext>().cloned();
    let request_id = ctx
        .as_ref()
        .map(|c| c.request_id.clone())
        .unwrap_or_default();
    let client_ip = ctx
        .as_ref()
        .and_then(|c| c.client_ip.clone())
        .unwrap_or_else(|| "-".to_string());

    tracing::info!(
        request_id = %request_id,
        client_ip = %client_ip,
        method = %method,
        path = %uri,
        "request received"
    );

    let response = next.run(request).await;

    let elapsed = ctx.map(|c| c.elapsed_ms()).unwrap_or(0);
    let status = response.status().as_u16();

    tracing::info!(
        request_id = %request_id,
        status = status,
        elapsed_ms = elapsed,
        "request completed"
    );

    response
}
