// Library exports for the binary, benchmarks and integration tests

// ===== Redirect resolution core =====
pub mod index;
pub mod matcher;
pub mod model;

// ===== Index maintenance =====
pub mod events;
pub mod maintainer;
pub mod snapshot;
pub mod source;

// ===== Servers =====
pub mod admin_api;
pub mod interceptor;

pub mod config;
pub mod error;
pub mod metrics;

// Don't export internal modules
mod backoff;
