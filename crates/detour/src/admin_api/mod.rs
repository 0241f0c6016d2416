//! Admin REST API for the redirect engine.
//!
//! - `GET /health`, `GET /metrics`
//! - `GET /sites`, `GET /sites/{site}`, `GET /sites/{site}/rules`
//! - `POST /sites/{site}/rebuild` (forced, ignores the retry window)
//! - `POST /events` (one change event or an array of them)
//! - `GET /resolve?site=..&path=..[&query=..]` (dry-run decision)
//!
//! The API listens on a configurable port (default: 9090).

mod handlers;
mod router;
mod server;
mod types;

pub use server::AdminApiServer;
