//! Site inspection, rebuild and dry-run resolution handlers.

use crate::admin_api::server::AdminState;
use crate::admin_api::types::*;
use crate::error::MaintainerError;
use crate::model::QueryParams;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// GET /sites
pub fn handle_list(state: &AdminState) -> Response<Full<Bytes>> {
    let response = SitesResponse {
        sites: state.maintainer.status(),
    };
    json_response(StatusCode::OK, &response)
}

/// GET /sites/{site}
pub fn handle_get(site: &str, state: &AdminState) -> Response<Full<Bytes>> {
    match state.maintainer.site_status(site) {
        Some(status) => json_response(StatusCode::OK, &status),
        None => error_response(StatusCode::NOT_FOUND, &format!("Unknown site '{site}'")),
    }
}

/// GET /sites/{site}/rules
pub fn handle_rules(site: &str, state: &AdminState) -> Response<Full<Bytes>> {
    if state.maintainer.site_status(site).is_none() {
        return error_response(StatusCode::NOT_FOUND, &format!("Unknown site '{site}'"));
    }
    let rules: Vec<_> = state
        .maintainer
        .index(site)
        .map(|index| index.rules().iter().map(|rule| rule.as_ref().clone()).collect())
        .unwrap_or_default();
    let response = RulesResponse {
        site: site.to_string(),
        count: rules.len(),
        rules,
    };
    json_response(StatusCode::OK, &response)
}

/// POST /sites/{site}/rebuild
pub fn handle_rebuild(site: &str, state: &AdminState) -> Response<Full<Bytes>> {
    match state.maintainer.force_rebuild(site) {
        Ok(request) => json_response(StatusCode::ACCEPTED, &RebuildResponse::new(site, request)),
        Err(e @ MaintainerError::UnknownSite(_)) => {
            error_response(StatusCode::NOT_FOUND, &e.to_string())
        }
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()),
    }
}

/// GET /resolve?site=..&path=..[&query=..]
pub fn handle_resolve(query: Option<&str>, state: &AdminState) -> Response<Full<Bytes>> {
    let params = QueryParams::from_query(query);
    let (Some(site), Some(path)) = (params.values("site").next(), params.values("path").next())
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Both 'site' and 'path' query parameters are required",
        );
    };
    if state.maintainer.site_status(site).is_none() {
        return error_response(StatusCode::NOT_FOUND, &format!("Unknown site '{site}'"));
    }

    let request_query = QueryParams::parse(params.values("query").next().unwrap_or(""));
    let decision = state.maintainer.resolve(site, path, &request_query);
    let response = ResolveResponse {
        site: site.to_string(),
        path: path.to_string(),
        decision: decision.kind(),
        rule_id: decision.rule().map(|rule| rule.id.to_string()),
        location: decision
            .rule()
            .map(|rule| rule.location(&request_query, state.keep_source_params)),
    };
    json_response(StatusCode::OK, &response)
}
