use std::time::Duration;

use tokio::time::Instant;

use super::fingerprint::{Fingerprint, FingerprintInputs};
use super::store::{PassStore, Retain};
use super::{token, ConsumeOutcome, PassError, PassRecord, RejectReason};
use crate::config::PassConfig;

pub const MIN_TTL_SECS: u64 = 10;
pub const MAX_TTL_SECS: u64 = 3600;
pub const MIN_USES: u32 = 1;
pub const MAX_USES: u32 = 50;

/// Clamp a configured TTL into `[MIN_TTL_SECS, MAX_TTL_SECS]`.
/// Zero and negative values land on the minimum.
pub fn clamp_ttl(secs: i64) -> Duration {
    let secs = secs.clamp(MIN_TTL_SECS as i64, MAX_TTL_SECS as i64);
    Duration::from_secs(secs as u64)
}

/// Clamp a configured use count into `[MIN_USES, MAX_USES]`.
pub fn clamp_max_uses(uses: i64) -> u32 {
    uses.clamp(MIN_USES as i64, MAX_USES as i64) as u32
}

/// A freshly minted pass, ready for the caller to hand to the client.
#[derive(Debug, Clone)]
pub struct IssuedPass {
    pub token: String,
    pub ttl: Duration,
    pub max_uses: u32,
}

/// Issue and consume policy over a [`PassStore`].
///
/// Holds no per-pass state of its own; cloning is cheap and every clone
/// shares the same store.
#[derive(Clone)]
pub struct PassService {
    store: PassStore,
    enabled: bool,
    ttl: Duration,
    max_uses: u32,
    bind_address: bool,
    bind_user_agent: bool,
}

impl PassService {
    pub fn new(store: PassStore, config: &PassConfig) -> Self {
        let ttl = clamp_ttl(config.ttl_secs);
        let max_uses = clamp_max_uses(config.max_uses);
        if ttl.as_secs() as i64 != config.ttl_secs || max_uses as i64 != config.max_uses {
            tracing::warn!(
                configured_ttl = config.ttl_secs,
                configured_uses = config.max_uses,
                ttl_secs = ttl.as_secs(),
                max_uses,
                "pass settings out of range, clamped"
            );
        }

        Self {
            store,
            enabled: config.enabled,
            ttl,
            max_uses,
            bind_address: config.bind_address,
            bind_user_agent: config.bind_user_agent,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_uses(&self) -> u32 {
        self.max_uses
    }

    pub fn store(&self) -> &PassStore {
        &self.store
    }

    fn fingerprint(&self, inputs: &FingerprintInputs) -> Fingerprint {
        Fingerprint::from_inputs(inputs, self.bind_address, self.bind_user_agent)
    }

    /// Mint a pass bound to `inputs`.
    ///
    /// The caller must already have verified the challenge for this request.
    /// Fails only when passes are disabled, which means the caller is wired
    /// up wrong.
    pub fn issue(&self, inputs: &FingerprintInputs) -> Result<IssuedPass, PassError> {
        if !self.enabled {
            return Err(PassError::Disabled);
        }

        let token = token::generate();
        let record = PassRecord::new(
            self.fingerprint(inputs),
            Instant::now() + self.ttl,
            self.max_uses,
        );
        self.store.set(token.clone(), record);

        tracing::debug!(
            pass = token::redact(&token),
            ttl_secs = self.ttl.as_secs(),
            max_uses = self.max_uses,
            "issued access pass"
        );

        Ok(IssuedPass {
            token,
            ttl: self.ttl,
            max_uses: self.max_uses,
        })
    }

    /// Validate `presented` against the requesting client and spend one use.
    ///
    /// A pass with N uses is accepted exactly N times: the call that takes
    /// the count to zero is accepted and evicts the pass. A fingerprint
    /// mismatch is rejected without spending a use.
    pub fn consume(&self, presented: Option<&str>, inputs: &FingerprintInputs) -> ConsumeOutcome {
        if !self.enabled {
            return ConsumeOutcome::Rejected(RejectReason::FeatureDisabled);
        }

        let presented = match presented.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return ConsumeOutcome::Rejected(RejectReason::MissingPass),
        };

        let subject = self.fingerprint(inputs);
        let now = Instant::now();

        let outcome = self
            .store
            .update(presented, |record| {
                if !record.subject().matches(&subject) {
                    return (ConsumeOutcome::Rejected(RejectReason::SubjectMismatch), Retain::Keep);
                }
                if record.is_expired_at(now) {
                    return (ConsumeOutcome::Rejected(RejectReason::ExpiredPass), Retain::Evict);
                }
                let remaining_uses = record.take_use();
                let retain = if remaining_uses == 0 { Retain::Evict } else { Retain::Keep };
                (ConsumeOutcome::Accepted { remaining_uses }, retain)
            })
            .unwrap_or(ConsumeOutcome::Rejected(RejectReason::UnknownOrExpiredPass));

        match outcome {
            ConsumeOutcome::Accepted { remaining_uses } => {
                tracing::debug!(pass = token::redact(presented), remaining_uses, "access pass accepted");
            }
            ConsumeOutcome::Rejected(reason) => {
                tracing::debug!(pass = token::redact(presented), %reason, "access pass rejected");
            }
        }

        outcome
    }
}
