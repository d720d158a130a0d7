/// HTTP client for the single guarded upstream call.
/// Uses reqwest-middleware for retries.
use bytes::Bytes;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::errors::AppError;

pub struct UpstreamClient {
    client: ClientWithMiddleware,
    url: String,
    api_key: Option<String>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(32)
            .timeout(Duration::from_secs(config.timeout_secs)) // Total timeout including retries
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        // Retries: 3 times, exponential backoff
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// POST `body` to the configured upstream with the server-side API key.
    /// The client's own credentials never reach the upstream.
    pub async fn relay(&self, body: Bytes, content_type: &str) -> Result<reqwest::Response, AppError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_str(content_type)
                    .unwrap_or_else(|_| HeaderValue::from_static("application/json")),
            )
            .body(body);

        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {}", key));
        }

        request.send().await.map_err(|e| {
            // reqwest-middleware errors are compound, but to_string() gives details
            tracing::warn!("Upstream request failed after retries: {}", e);
            AppError::Upstream("upstream request failed".to_string())
        })
    }
}
