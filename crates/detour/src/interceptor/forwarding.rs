//! Request forwarding to the origin server.

use super::client::HttpClient;
use super::redirect::{VALUE_TRUE, X_DETOUR_PROXIED};
use super::response_ext::{ProxyBody, ResponseExt};
use crate::metrics;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::HOST;
use hyper::{Request, Response};
use std::time::Instant;
use tracing::{debug, error};

/// JSON error response.
pub fn error_response(status: u16, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn upstream_request(
    req: Request<Incoming>,
    upstream_uri: &str,
) -> Result<Request<ProxyBody>, hyper::http::Error> {
    let (parts, body) = req.into_parts();
    let upstream_path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let full_uri = format!("{upstream_uri}{upstream_path}");
    debug!("Forwarding {} to: {}", parts.method, full_uri);

    let mut builder = Request::builder().method(parts.method).uri(full_uri);
    for (key, value) in parts.headers.iter() {
        if key != HOST {
            builder = builder.header(key, value);
        }
    }
    builder.body(body.boxed())
}

async fn send(
    http_client: &HttpClient,
    req: Request<Incoming>,
    upstream_uri: &str,
) -> Result<Response<Incoming>, Response<Full<Bytes>>> {
    let method = req.method().clone();
    let upstream_req = upstream_request(req, upstream_uri).map_err(|e| {
        error!("Failed to build upstream request: {}", e);
        error_response(502, "Bad Gateway")
    })?;

    let start = Instant::now();
    match http_client.request(upstream_req).await {
        Ok(response) => {
            metrics::record_upstream_duration(
                method.as_str(),
                response.status().as_u16(),
                start.elapsed().as_secs_f64() * 1000.0,
            );
            Ok(response)
        }
        Err(e) => {
            error!("Failed to forward request to upstream: {}", e);
            Err(error_response(502, "Bad Gateway"))
        }
    }
}

/// Pass the request through and stream the response back without buffering.
pub async fn forward_streaming(
    http_client: &HttpClient,
    req: Request<Incoming>,
    upstream_uri: &str,
) -> Response<ProxyBody> {
    match send(http_client, req, upstream_uri).await {
        Ok(response) => {
            let (mut parts, body) = response.into_parts();
            parts.headers.insert(X_DETOUR_PROXIED.clone(), VALUE_TRUE.clone());
            Response::from_parts(parts, body.boxed())
        }
        Err(response) => response.into_boxed(),
    }
}

/// Forward the request and hold the complete response so the caller can still
/// replace it once the status is known.
pub async fn forward_buffered(
    http_client: &HttpClient,
    req: Request<Incoming>,
    upstream_uri: &str,
) -> Response<Full<Bytes>> {
    let response = match send(http_client, req, upstream_uri).await {
        Ok(response) => response,
        Err(response) => return response,
    };
    let (mut parts, body) = response.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("Failed to collect upstream response body: {}", e);
            return error_response(502, "Failed to read upstream response");
        }
    };
    parts.headers.insert(X_DETOUR_PROXIED.clone(), VALUE_TRUE.clone());
    Response::from_parts(parts, Full::new(body_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_is_json() {
        let response = error_response(502, "Bad Gateway");
        assert_eq!(response.status(), 502);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_error_response_escapes_message() {
        let response = error_response(400, r#"bad "quote""#);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], r#"bad "quote""#);
    }
}
