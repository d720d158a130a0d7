//! Cloudflare Turnstile siteverify client.
//!
//! POSTs `secret`, `response` and `remoteip` as a form to the configured
//! endpoint and reads `{"success": bool, "error-codes": [...]}`. Any
//! siteverify-compatible service (hCaptcha, reCAPTCHA) speaks the same shape.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ChallengeError, ChallengeVerifier};
use crate::config::ChallengeConfig;

/// Wall-clock budget for one siteverify round trip.
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

pub struct TurnstileVerifier {
    client: reqwest::Client,
    verify_url: String,
    secret: Option<String>,
    timeout: Duration,
}

impl TurnstileVerifier {
    pub fn new(config: &ChallengeConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self {
            client,
            verify_url: config.verify_url.clone(),
            secret: config.secret.clone(),
            timeout: Duration::from_secs(DEFAULT_VERIFY_TIMEOUT_SECS),
        })
    }

    async fn siteverify(&self, secret: &str, response: &str, remote_ip: Option<&str>) -> Result<bool, ChallengeError> {
        let mut form = vec![("secret", secret), ("response", response)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let resp = self.client.post(&self.verify_url).form(&form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChallengeError::Status(status.as_u16()));
        }

        let body: SiteverifyResponse = resp.json().await?;
        if !body.success {
            tracing::debug!(error_codes = ?body.error_codes, "challenge rejected by verifier");
        }
        Ok(body.success)
    }
}

#[async_trait]
impl ChallengeVerifier for TurnstileVerifier {
    async fn verify(&self, response: &str, remote_ip: Option<&str>) -> Result<bool, ChallengeError> {
        let response = response.trim();
        if response.is_empty() {
            return Ok(false);
        }
        let Some(secret) = self.secret.as_deref() else {
            tracing::warn!("no challenge secret configured, rejecting challenge");
            return Ok(false);
        };

        tokio::time::timeout(self.timeout, self.siteverify(secret, response, remote_ip))
            .await
            .unwrap_or(Err(ChallengeError::Timeout(self.timeout.as_secs())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn verifier(server: &MockServer, secret: Option<&str>) -> TurnstileVerifier {
        TurnstileVerifier::new(&ChallengeConfig {
            header: "x-challenge-token".into(),
            secret: secret.map(String::from),
            verify_url: format!("{}/siteverify", server.uri()),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_verify_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .and(body_string_contains("secret=s3cret"))
            .and(body_string_contains("response=good-token"))
            .and(body_string_contains("remoteip=203.0.113.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "error-codes": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ok = verifier(&server, Some("s3cret"))
            .verify("good-token", Some("203.0.113.7"))
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_verify_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error-codes": ["invalid-input-response"]
            })))
            .mount(&server)
            .await;

        let ok = verifier(&server, Some("s3cret"))
            .verify("bad-token", None)
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_verify_http_error_is_err() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = verifier(&server, Some("s3cret"))
            .verify("token", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChallengeError::Status(503)));
    }

    #[tokio::test]
    async fn test_blank_response_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let v = verifier(&server, Some("s3cret"));
        assert!(!v.verify("   ", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_secret_rejects_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let v = verifier(&server, None);
        assert!(!v.verify("token", None).await.unwrap());
    }
}
