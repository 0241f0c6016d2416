//! Response body conversions.

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use std::convert::Infallible;

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

pub trait ResponseExt {
    /// Box a fully buffered body so it can be returned next to streamed ones.
    fn into_boxed(self) -> Response<ProxyBody>;
}

impl ResponseExt for Response<Full<Bytes>> {
    fn into_boxed(self) -> Response<ProxyBody> {
        self.map(|b| BoxBody::new(b.map_err(|never: Infallible| match never {})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_into_boxed_preserves_parts() {
        let response = Response::builder()
            .status(404)
            .header("X-Custom", "value")
            .body(Full::new(Bytes::from("not found")))
            .unwrap();

        let boxed = response.into_boxed();
        assert_eq!(boxed.status(), 404);
        assert_eq!(boxed.headers()["x-custom"], "value");
        let body = boxed.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("not found"));
    }
}
