//! Request interceptor: the HTTP front of the redirect engine.
//!
//! Every request is resolved against its site's index before it reaches the
//! origin:
//!
//! - `SendNow` answers with a `301` directly; the origin never sees the request.
//! - `DeferUntilNotFound` forwards, buffers the origin response, and swaps a
//!   `404` for the `301`. Any other status is released unchanged.
//! - `None` streams the request and response straight through.
//!
//! # Module Structure
//!
//! - `server` - InterceptorServer and the accept loop
//! - `handler` - decision handling per request
//! - `forwarding` - streaming and buffered forwarding to the origin
//! - `redirect` - the redirect response
//! - `sites` - host to site mapping
//! - `client` - pooled HTTP client
//! - `network` - listener setup

mod client;
mod forwarding;
mod handler;
mod network;
mod redirect;
mod response_ext;
mod server;
mod sites;

pub use forwarding::error_response;
pub use network::create_reusable_listener;
pub use redirect::redirect_response;
pub use server::InterceptorServer;
pub use sites::SiteRouter;
