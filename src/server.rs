use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::challenge::{ChallengeVerifier, TurnstileVerifier};
use crate::config::Config;
use crate::middleware;
use crate::pass::{PassService, PassStore};
use crate::proxy;

/// Request bodies above this are refused before they reach the gate.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Parsed header names the gate reads and writes.
pub struct GateHeaders {
    pub pass: HeaderName,
    pub pass_ttl: HeaderName,
    pub pass_uses: HeaderName,
    pub challenge: HeaderName,
}

impl GateHeaders {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let name = |s: &str| {
            HeaderName::from_bytes(s.as_bytes()).with_context(|| format!("invalid header name '{}'", s))
        };
        Ok(Self {
            pass: name(&config.pass.header)?,
            pass_ttl: name(&format!("{}-ttl", config.pass.header))?,
            pass_uses: name(&format!("{}-uses", config.pass.header))?,
            challenge: name(&config.challenge.header)?,
        })
    }
}

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: Config,
    pub passes: PassService,
    pub verifier: Arc<dyn ChallengeVerifier>,
    pub upstream: proxy::upstream::UpstreamClient,
    pub headers: GateHeaders,
}

impl AppState {
    /// Build state with the production Turnstile verifier.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let verifier = Arc::new(TurnstileVerifier::new(&config.challenge)?);
        Self::with_verifier(config, verifier)
    }

    pub fn with_verifier(config: Config, verifier: Arc<dyn ChallengeVerifier>) -> anyhow::Result<Self> {
        let store = PassStore::new(config.pass.max_entries);
        let passes = PassService::new(store, &config.pass);
        let upstream = proxy::upstream::UpstreamClient::new(&config.upstream)?;
        let headers = GateHeaders::from_config(&config)?;
        Ok(Self {
            config,
            passes,
            verifier,
            upstream,
            headers,
        })
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    let guarded = Router::new()
        .route("/api/relay", post(proxy::handler::relay_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::gate::gate,
        ));

    Router::new()
        // Health endpoints (no gate)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .merge(guarded)
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors_layer(&state))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware))
}

/// Browsers may only call from the configured origin, and may read the pass
/// headers so the page can replay them.
fn cors_layer(state: &AppState) -> CorsLayer {
    let allowed_origin = state.config.allowed_origin.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin.as_bytes() == allowed_origin.as_bytes()
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            state.headers.pass.clone(),
            state.headers.challenge.clone(),
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([
            state.headers.pass.clone(),
            state.headers.pass_ttl.clone(),
            state.headers.pass_uses.clone(),
        ])
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with gateway logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn readiness_check() -> &'static str {
    "ok"
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    // Passes must never be cached by intermediaries
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.remove(header::SERVER);

    resp
}
