//! Route dispatch for the Admin API.

use crate::admin_api::handlers::{events, sites, system};
use crate::admin_api::server::AdminState;
use crate::admin_api::types::not_found;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Routes under `/sites/{site}`.
enum SiteRoute {
    Root,
    Rules,
    Rebuild,
}

impl SiteRoute {
    fn parse(segments: &[&str]) -> Option<Self> {
        match segments {
            [] | [""] => Some(SiteRoute::Root),
            ["rules"] => Some(SiteRoute::Rules),
            ["rebuild"] => Some(SiteRoute::Rebuild),
            _ => None,
        }
    }
}

pub async fn route_request(
    req: Request<Incoming>,
    state: Arc<AdminState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());

    debug!("Admin API: {} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => system::handle_health(&state),
        (&Method::GET, "/metrics") => system::handle_metrics(),
        (&Method::GET, "/sites") => sites::handle_list(&state),
        (&Method::POST, "/events") => events::handle_events(req, &state).await,
        (&Method::GET, "/resolve") => sites::handle_resolve(query.as_deref(), &state),
        _ => match path.strip_prefix("/sites/") {
            Some(rest) => route_site(&method, rest, &state),
            None => not_found(),
        },
    };
    Ok(response)
}

fn route_site(method: &Method, path: &str, state: &AdminState) -> Response<Full<Bytes>> {
    let segments: Vec<&str> = path.split('/').collect();
    let Some((site, rest)) = segments.split_first() else {
        return not_found();
    };
    let site = urlencoding::decode(site)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| site.to_string());

    match (method, SiteRoute::parse(rest)) {
        (&Method::GET, Some(SiteRoute::Root)) => sites::handle_get(&site, state),
        (&Method::GET, Some(SiteRoute::Rules)) => sites::handle_rules(&site, state),
        (&Method::POST, Some(SiteRoute::Rebuild)) => sites::handle_rebuild(&site, state),
        _ => not_found(),
    }
}
