//! passgate — a request-verification gate in front of one outbound API call.
//!
//! Clients solve a third-party challenge once and receive a short-lived,
//! client-bound access pass that skips verification for a bounded number of
//! requests. See [`pass`] for the pass lifecycle and [`middleware::gate`] for
//! how the HTTP layer drives it.

pub mod challenge;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod middleware;
pub mod pass;
pub mod proxy;
pub mod server;
