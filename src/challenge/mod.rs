pub mod turnstile;

use async_trait::async_trait;
use thiserror::Error;

pub use turnstile::TurnstileVerifier;

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("verifier request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("verifier returned HTTP {0}")]
    Status(u16),

    #[error("verifier timed out after {0}s")]
    Timeout(u64),
}

/// Abstraction over third-party challenge verification.
/// Implementations: TurnstileVerifier (Cloudflare siteverify protocol).
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    /// Check a client's challenge response. `Ok(false)` means the vendor
    /// rejected it; `Err` means the vendor could not be asked.
    async fn verify(&self, response: &str, remote_ip: Option<&str>) -> Result<bool, ChallengeError>;
}
