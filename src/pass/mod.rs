//! Short-lived access passes.
//!
//! A client that has just solved the challenge receives an opaque pass token.
//! Presenting it on later requests skips challenge verification until the
//! pass runs out of uses or expires. Passes are bound to a fingerprint of the
//! client that earned them, so a token lifted from one client is useless from
//! another.
//!
//! - [`store::PassStore`] owns every [`PassRecord`] and serializes mutation
//!   per token.
//! - [`service::PassService`] applies issuance and consumption policy.

pub mod fingerprint;
pub mod service;
pub mod store;
pub mod token;

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

pub use fingerprint::{Fingerprint, FingerprintInputs};
pub use service::{IssuedPass, PassService};
pub use store::{PassStore, Retain};

/// One issued capability. Only the pass service creates records; callers
/// outside the crate see read-only snapshots from [`PassStore::get`].
///
/// ```compile_fail
/// use passgate::pass::{Fingerprint, FingerprintInputs, PassRecord};
/// let fp = Fingerprint::from_inputs(&FingerprintInputs::new("10.0.0.1", "curl/8"), true, true);
/// let _ = PassRecord::new(fp, tokio::time::Instant::now(), 1);
/// ```
///
/// Only `remaining_uses` ever changes after construction, and only downwards
/// through [`PassRecord::take_use`] while the store holds the entry's lock.
#[derive(Debug, Clone)]
pub struct PassRecord {
    subject: Fingerprint,
    expires_at: Instant,
    remaining_uses: u32,
}

impl PassRecord {
    pub(crate) fn new(subject: Fingerprint, expires_at: Instant, uses: u32) -> Self {
        Self {
            subject,
            expires_at,
            remaining_uses: uses,
        }
    }

    pub fn subject(&self) -> &Fingerprint {
        &self.subject
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn remaining_uses(&self) -> u32 {
        self.remaining_uses
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Spend one use and return how many are left.
    pub(crate) fn take_use(&mut self) -> u32 {
        self.remaining_uses = self.remaining_uses.saturating_sub(1);
        self.remaining_uses
    }
}

/// Why a presented pass was not accepted.
///
/// These are ordinary outcomes: the gate falls back to full challenge
/// verification for every one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    FeatureDisabled,
    MissingPass,
    UnknownOrExpiredPass,
    SubjectMismatch,
    ExpiredPass,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::FeatureDisabled => "feature-disabled",
            RejectReason::MissingPass => "missing-pass",
            RejectReason::UnknownOrExpiredPass => "unknown-or-expired-pass",
            RejectReason::SubjectMismatch => "subject-mismatch",
            RejectReason::ExpiredPass => "expired-pass",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of presenting a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The pass was valid and one use was spent. `remaining_uses` is the
    /// count left after this use; zero means the pass was just evicted.
    Accepted { remaining_uses: u32 },
    Rejected(RejectReason),
}

impl ConsumeOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ConsumeOutcome::Accepted { .. })
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            ConsumeOutcome::Accepted { .. } => None,
            ConsumeOutcome::Rejected(reason) => Some(*reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum PassError {
    /// Issue was called with passes switched off. This is a wiring bug in
    /// the caller, not something a client can trigger.
    #[error("access passes are disabled")]
    Disabled,
}
