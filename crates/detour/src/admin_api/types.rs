//! Response types and helpers for the Admin API.

use crate::maintainer::{ApplyOutcome, RebuildRequest, SiteStatus};
use crate::model::Rule;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SitesResponse {
    pub sites: Vec<SiteStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesResponse {
    pub site: String,
    pub count: usize,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub site: String,
    pub result: &'static str,
}

impl RebuildResponse {
    pub fn new(site: &str, request: RebuildRequest) -> Self {
        let result = match request {
            RebuildRequest::Scheduled => "scheduled",
            RebuildRequest::Collapsed => "collapsed",
            RebuildRequest::RateLimited => "rateLimited",
        };
        Self {
            site: site.to_string(),
            result,
        }
    }
}

/// Outcome of one applied change event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    pub rule_id: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventResult {
    pub fn applied(rule_id: String, outcome: ApplyOutcome) -> Self {
        let (outcome, site) = match outcome {
            ApplyOutcome::Queued { site } => ("queued", Some(site)),
            ApplyOutcome::QueuedWithRebuild { site, .. } => ("queuedWithRebuild", Some(site)),
            ApplyOutcome::Orphaned => ("orphaned", None),
        };
        Self {
            rule_id,
            outcome,
            site,
            error: None,
        }
    }

    pub fn failed(rule_id: String, error: String) -> Self {
        Self {
            rule_id,
            outcome: "failed",
            site: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub results: Vec<EventResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub site: String,
    pub path: String,
    pub decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

// =============================================================================
// Response helper functions
// =============================================================================

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build an HTTP response with headers, falling back to a bare response if the
/// builder rejects them.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}

pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: status.as_str().to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    use http_body_util::BodyExt;
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_format() {
        let resp = error_response(StatusCode::BAD_REQUEST, "Test error");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get("Content-Type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_not_found_response() {
        assert_eq!(not_found().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_rebuild_response_labels() {
        let body = serde_json::to_value(RebuildResponse::new("shop", RebuildRequest::Collapsed))
            .unwrap();
        assert_eq!(body, serde_json::json!({"site": "shop", "result": "collapsed"}));
    }

    #[test]
    fn test_event_result_serialization() {
        let applied = EventResult::applied(
            "7".to_string(),
            ApplyOutcome::Queued {
                site: "corporate".to_string(),
            },
        );
        let body = serde_json::to_value(applied).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"ruleId": "7", "outcome": "queued", "site": "corporate"})
        );

        let orphan = serde_json::to_value(EventResult::applied(
            "8".to_string(),
            ApplyOutcome::Orphaned,
        ))
        .unwrap();
        assert_eq!(orphan, serde_json::json!({"ruleId": "8", "outcome": "orphaned"}));
    }
}
