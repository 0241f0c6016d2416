//! Change event intake.

use crate::admin_api::server::AdminState;
use crate::admin_api::types::*;
use crate::events::EventBatch;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{error, info};

/// POST /events - apply one change event or an array of them
pub async fn handle_events(req: Request<Incoming>, state: &Arc<AdminState>) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    let batch: EventBatch = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid change event: {e}"))
        }
    };
    let events = batch.into_events();
    info!("Received {} change events", events.len());

    // applying may wait on per-site locks held by maintenance threads
    let state = Arc::clone(state);
    let applied = tokio::task::spawn_blocking(move || {
        events
            .into_iter()
            .map(|event| {
                let rule_id = event.rule_id.clone();
                match state.maintainer.apply(event) {
                    Ok(outcome) => EventResult::applied(rule_id, outcome),
                    Err(e) => EventResult::failed(rule_id, e.to_string()),
                }
            })
            .collect::<Vec<_>>()
    })
    .await;

    match applied {
        Ok(results) => json_response(StatusCode::ACCEPTED, &EventsResponse { results }),
        Err(e) => {
            error!("Event application task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to apply events")
        }
    }
}
