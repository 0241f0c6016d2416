//! Per-request redirect handling.

use super::client::HttpClient;
use super::forwarding::{forward_buffered, forward_streaming};
use super::redirect::redirect_response;
use super::response_ext::{ProxyBody, ResponseExt};
use super::sites::SiteRouter;
use crate::maintainer::IndexMaintainer;
use crate::matcher::Decision;
use crate::metrics;
use crate::model::{QueryParams, Rule};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::HOST;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::time::Instant;
use tracing::{debug, warn};

/// Everything a request needs, borrowed from the server.
pub struct RequestContext<'a> {
    pub http_client: &'a HttpClient,
    pub maintainer: &'a IndexMaintainer,
    pub sites: &'a SiteRouter,
    pub upstream_uri: &'a str,
    pub keep_source_params: bool,
}

pub async fn handle_request(
    ctx: &RequestContext<'_>,
    req: Request<Incoming>,
) -> Result<Response<ProxyBody>, Infallible> {
    let start = Instant::now();
    let method = req.method().clone();

    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host());
    let site = ctx.sites.site_for(host).map(str::to_string);
    let query = QueryParams::from_query(req.uri().query());

    let decision = match &site {
        Some(site) => {
            let decision = ctx.maintainer.resolve(site, req.uri().path(), &query);
            metrics::record_decision(site, decision.kind());
            decision
        }
        None => Decision::None,
    };
    let site_label = site.as_deref().unwrap_or("-");
    debug!(
        "{} {} on site {}: {}",
        method,
        req.uri().path(),
        site_label,
        decision.kind()
    );

    let response = match &decision {
        Decision::SendNow(rule) => match redirect_for(ctx, rule, &query) {
            Some(redirect) => {
                metrics::record_redirect_sent(site_label, "immediate");
                redirect.into_boxed()
            }
            None => forward_streaming(ctx.http_client, req, ctx.upstream_uri).await,
        },
        Decision::DeferUntilNotFound(rule) => {
            let upstream = forward_buffered(ctx.http_client, req, ctx.upstream_uri).await;
            if upstream.status() == StatusCode::NOT_FOUND {
                match redirect_for(ctx, rule, &query) {
                    Some(redirect) => {
                        metrics::record_redirect_sent(site_label, "after_not_found");
                        redirect.into_boxed()
                    }
                    None => upstream.into_boxed(),
                }
            } else {
                upstream.into_boxed()
            }
        }
        Decision::None => forward_streaming(ctx.http_client, req, ctx.upstream_uri).await,
    };

    metrics::record_request(method.as_str(), response.status().as_u16());
    metrics::record_proxy_duration(
        method.as_str(),
        start.elapsed().as_secs_f64() * 1000.0,
        decision.kind(),
    );
    Ok(response)
}

fn redirect_for(
    ctx: &RequestContext<'_>,
    rule: &Rule,
    query: &QueryParams,
) -> Option<Response<Full<Bytes>>> {
    let location = rule.location(query, ctx.keep_source_params);
    match redirect_response(&location, rule.id.as_str()) {
        Ok(response) => {
            debug!("Redirecting to {} (rule {})", location, rule.id);
            Some(response)
        }
        Err(e) => {
            warn!(
                "Rule {} produced an unusable location '{}': {}",
                rule.id, location, e
            );
            None
        }
    }
}
