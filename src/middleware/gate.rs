//! Request gate: access pass first, full challenge verification second.
//!
//! 1. Consume the pass presented in the pass header. Accepted → run the
//!    guarded handler directly.
//! 2. Otherwise require a challenge response header and verify it with the
//!    configured vendor. Missing → 401, rejected → 403.
//! 3. After a successful verification, issue a new pass bound to this client
//!    and return it in the pass headers.
//!
//! Clients never learn why a pass was refused; they are simply asked for the
//! challenge again.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::AppError;
use crate::pass::{FingerprintInputs, IssuedPass, RejectReason};
use crate::server::AppState;

/// Stand-in when the transport gives us no peer address.
const UNKNOWN_ADDRESS: &str = "unknown";

/// Resolve the client address used for pass binding.
///
/// With `trust_forwarded_for`, the first `X-Forwarded-For` hop wins; this is
/// only sound behind a proxy that overwrites the header.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }
    peer.map(|p| p.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn gate(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let headers = req.headers();

    let address = client_address(headers, peer, state.config.trust_forwarded_for);
    let user_agent = header_str(headers, &header::USER_AGENT).unwrap_or_default();
    let inputs = FingerprintInputs::new(address, user_agent);

    // -- 1. Access pass --
    let outcome = state
        .passes
        .consume(header_str(headers, &state.headers.pass), &inputs);
    if outcome.is_accepted() {
        return Ok(next.run(req).await);
    }
    match outcome.reason() {
        Some(RejectReason::MissingPass) | Some(RejectReason::FeatureDisabled) | None => {}
        Some(reason) => {
            tracing::info!(%reason, client = %inputs.address, "access pass refused, falling back to challenge");
        }
    }

    // -- 2. Challenge verification --
    let challenge = header_str(headers, &state.headers.challenge)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or(AppError::ChallengeRequired)?;

    let verified = match state.verifier.verify(&challenge, Some(&inputs.address)).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "challenge verifier unavailable, treating as failed");
            false
        }
    };
    if !verified {
        return Err(AppError::ChallengeFailed);
    }

    // -- 3. Issue a pass for next time --
    let issued = if state.passes.is_enabled() {
        Some(
            state
                .passes
                .issue(&inputs)
                .map_err(|e| AppError::Internal(e.into()))?,
        )
    } else {
        None
    };

    let mut resp = next.run(req).await;
    if let Some(pass) = issued {
        attach_pass(&state, resp.headers_mut(), &pass);
    }
    Ok(resp)
}

fn attach_pass(state: &AppState, headers: &mut HeaderMap, pass: &IssuedPass) {
    match HeaderValue::from_str(&pass.token) {
        Ok(v) => {
            headers.insert(state.headers.pass.clone(), v);
        }
        Err(e) => {
            // base64url tokens are always valid header values
            tracing::error!("unencodable pass token: {}", e);
            return;
        }
    }
    headers.insert(state.headers.pass_ttl.clone(), HeaderValue::from(pass.ttl.as_secs()));
    headers.insert(state.headers.pass_uses.clone(), HeaderValue::from(pass.max_uses));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("198.51.100.4:52100".parse().unwrap())
    }

    #[test]
    fn test_client_address_uses_peer_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_address(&headers, peer(), false), "198.51.100.4");
    }

    #[test]
    fn test_client_address_trusts_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.2"),
        );
        assert_eq!(client_address(&headers, peer(), true), "203.0.113.9");
    }

    #[test]
    fn test_client_address_falls_back_when_header_blank() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        assert_eq!(client_address(&headers, peer(), true), "198.51.100.4");
        assert_eq!(client_address(&HeaderMap::new(), None, true), UNKNOWN_ADDRESS);
    }
}
