//! The redirect response sent to clients.

use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CACHE_CONTROL, EXPIRES, LOCATION, PRAGMA};
use hyper::{Response, StatusCode};
use http_body_util::Full;

pub static X_DETOUR_RULE: HeaderName = HeaderName::from_static("x-detour-rule");
pub static X_DETOUR_PROXIED: HeaderName = HeaderName::from_static("x-detour-proxied");

static NO_CACHE: HeaderValue = HeaderValue::from_static("no-cache, no-store, must-revalidate");
static PRAGMA_NO_CACHE: HeaderValue = HeaderValue::from_static("no-cache");
static EXPIRES_NOW: HeaderValue = HeaderValue::from_static("0");
pub static VALUE_TRUE: HeaderValue = HeaderValue::from_static("true");

/// `301 Moved Permanently` to `location`, marked uncacheable so that edits to
/// rules take effect for clients immediately.
///
/// Fails when `location` cannot be carried in a header (e.g. raw non-ASCII).
pub fn redirect_response(
    location: &str,
    rule_id: &str,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    let mut builder = Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(LOCATION, HeaderValue::from_str(location)?)
        .header(CACHE_CONTROL, NO_CACHE.clone())
        .header(PRAGMA, PRAGMA_NO_CACHE.clone())
        .header(EXPIRES, EXPIRES_NOW.clone());
    if let Ok(id) = HeaderValue::from_str(rule_id) {
        builder = builder.header(X_DETOUR_RULE.clone(), id);
    }
    builder.body(Full::new(Bytes::new()))
}
