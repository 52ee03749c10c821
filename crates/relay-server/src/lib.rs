//! HTTP surface: router assembly and the endpoint handlers that back it
//! (spec §4.8/§4.9), grounded on `crates/server/src/lib.rs::build_router`.

pub mod auth;
pub mod handler;
pub mod middleware;

use arc_swap::ArcSwap;
use axum::http::Method;
use axum::routing::{MethodFilter, get, on, post};
use axum::{Router, middleware as axum_mw};
use relay_core::config::RelayConfig;
use relay_core::metrics::Metrics;
use relay_engine::Relay;
use relay_store::{BasicEvaluator, Evaluator};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub config: Arc<ArcSwap<RelayConfig>>,
    pub metrics: Arc<Metrics>,
    pub evaluator: Arc<dyn Evaluator>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(relay: Arc<Relay>, config: Arc<ArcSwap<RelayConfig>>) -> Self {
        Self {
            relay,
            config,
            metrics: Arc::new(Metrics::new()),
            evaluator: Arc::new(BasicEvaluator),
            start_time: Instant::now(),
        }
    }
}

/// REPORT is not one of axum's built-in method constants; the SDKs that use
/// it (context-bearing eval/ping requests) send it as a literal verb.
fn report_filter() -> MethodFilter {
    MethodFilter::try_from(Method::from_bytes(b"REPORT").expect("REPORT is a valid method token"))
        .expect("REPORT maps to a MethodFilter bit")
}

pub fn build_router(state: AppState) -> Router {
    use handler::{events, evaluation, goals, health, polling, status, streaming};

    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/status", get(status::status));

    let server_routes = Router::new()
        .route("/all", get(streaming::server_all))
        .route("/flags", get(streaming::server_flags))
        .route("/bulk", post(events::server_bulk))
        .route("/diagnostic", post(events::server_diagnostic))
        .route("/sdk/flags", get(polling::all_flags))
        .route("/sdk/flags/{key}", get(polling::one_flag))
        .route("/sdk/segments/{key}", get(polling::one_segment))
        .route(
            "/sdk/evalx/context",
            on(report_filter(), evaluation::server_evalx_report),
        )
        .route(
            "/sdk/evalx/user",
            on(report_filter(), evaluation::server_evalx_report),
        )
        .route(
            "/sdk/evalx/contexts/{data}",
            get(evaluation::server_evalx_get),
        )
        .route(
            "/sdk/evalx/users/{data}",
            get(evaluation::server_evalx_get),
        )
        .route("/sdk/goals/{env_id}", get(goals::goals_proxy));

    let mobile_routes = Router::new()
        .route(
            "/msdk/evalx/context",
            on(report_filter(), evaluation::mobile_evalx_report),
        )
        .route(
            "/msdk/evalx/contexts/{data}",
            get(evaluation::mobile_evalx_get),
        )
        .route(
            "/meval",
            on(report_filter(), streaming::mobile_ping_report),
        )
        .route("/meval/{data}", get(streaming::mobile_ping_get))
        .route("/mping", get(streaming::mobile_ping_no_context))
        .route("/mobile/events/bulk", post(events::mobile_events))
        .route("/mobile/events/diagnostic", post(events::mobile_events))
        .route("/mobile/events", post(events::mobile_events))
        .route("/mobile", post(events::mobile_events));

    let js_routes = Router::new()
        .route(
            "/sdk/evalx/{env_id}/contexts/{data}",
            get(evaluation::js_evalx_get),
        )
        .route(
            "/sdk/evalx/{env_id}/context",
            on(report_filter(), evaluation::js_evalx_report),
        )
        .route("/eval/{env_id}", get(streaming::js_ping_no_context))
        .route("/eval/{env_id}/{data}", get(streaming::js_ping_get))
        .route("/ping/{env_id}", get(streaming::js_ping_no_context))
        .route("/events/bulk/{env_id}", post(events::js_events_bulk))
        .route(
            "/events/diagnostic/{env_id}",
            post(events::js_events_diagnostic),
        )
        .route("/a/{env_id}.gif", get(events::image_beacon));

    Router::new()
        .merge(public_routes)
        .merge(server_routes)
        .merge(mobile_routes)
        .merge(js_routes)
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::request_logging::request_logging_middleware,
        ))
        .layer(axum_mw::from_fn(
            middleware::request_context::request_context_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
