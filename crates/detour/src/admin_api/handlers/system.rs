//! System handlers: health and metrics.

use crate::admin_api::server::AdminState;
use crate::admin_api::types::*;
use crate::maintainer::SiteState;
use crate::metrics::collect_metrics;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// GET /health - Health check with a per-state site count
pub fn handle_health(state: &AdminState) -> Response<Full<Bytes>> {
    let statuses = state.maintainer.status();
    let count = |wanted: SiteState| statuses.iter().filter(|s| s.state == wanted).count();
    let body = serde_json::json!({
        "status": "ok",
        "sites": statuses.len(),
        "ready": count(SiteState::Ready),
        "rebuilding": count(SiteState::Rebuilding),
        "absent": count(SiteState::Absent),
    });
    json_response(StatusCode::OK, &body)
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics() -> Response<Full<Bytes>> {
    build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        collect_metrics(),
    )
}
