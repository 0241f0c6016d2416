//! InterceptorServer and its accept loop.

use super::client::{create_http_client, HttpClient};
use super::handler::{handle_request, RequestContext};
use super::network::create_reusable_listener;
use super::sites::SiteRouter;
use crate::config::Config;
use crate::maintainer::IndexMaintainer;
use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Reverse proxy that answers redirects itself and forwards everything else.
pub struct InterceptorServer {
    addr: SocketAddr,
    maintainer: Arc<IndexMaintainer>,
    sites: SiteRouter,
    upstream_uri: String,
    keep_source_params: bool,
    http_client: HttpClient,
}

impl InterceptorServer {
    pub fn new(config: &Config, maintainer: Arc<IndexMaintainer>) -> Result<Self, anyhow::Error> {
        let ip: IpAddr = config
            .listen
            .host
            .parse()
            .with_context(|| format!("Invalid listen host '{}'", config.listen.host))?;
        let http_client =
            create_http_client(&config.connection_pool, config.upstream.tls_skip_verify)?;

        Ok(Self {
            addr: SocketAddr::new(ip, config.listen.port),
            maintainer,
            sites: SiteRouter::from_config(config),
            upstream_uri: config.upstream.base_uri(),
            keep_source_params: config.rules.keep_source_params,
            http_client,
        })
    }

    /// Bind the configured address and serve until the task is dropped.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = create_reusable_listener(self.addr)
            .with_context(|| format!("Failed to bind proxy listener on {}", self.addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("Listening on http://{}", listener.local_addr()?);
        info!("Proxying to {}", self.upstream_uri);
        info!("Serving redirects for sites: {:?}", self.maintainer.sites());

        let server = Arc::new(self);
        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move {
                        let ctx = RequestContext {
                            http_client: &server.http_client,
                            maintainer: &server.maintainer,
                            sites: &server.sites,
                            upstream_uri: &server.upstream_uri,
                            keep_source_params: server.keep_source_params,
                        };
                        handle_request(&ctx, req).await
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", remote_addr, err);
                }
            });
        }
    }
}
