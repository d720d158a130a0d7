use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Stands in for a binding input that is switched off, so fingerprints stay
/// comparable whatever the toggles are.
const PLACEHOLDER: &str = "-";

/// Raw client attributes a pass can be bound to.
#[derive(Debug, Clone)]
pub struct FingerprintInputs {
    pub address: String,
    pub user_agent: String,
}

impl FingerprintInputs {
    pub fn new(address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// One-way SHA-256 digest (lowercase hex) over the bound client attributes.
#[derive(Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the enabled inputs. Each field is length-prefixed so that
    /// `("a:b", "c")` and `("a", "b:c")` cannot collide.
    pub fn from_inputs(inputs: &FingerprintInputs, bind_address: bool, bind_user_agent: bool) -> Self {
        let address = if bind_address { inputs.address.as_str() } else { PLACEHOLDER };
        let user_agent = if bind_user_agent { inputs.user_agent.as_str() } else { PLACEHOLDER };

        let mut hasher = Sha256::new();
        for part in [address, user_agent] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison; a mismatch says nothing about which
    /// attribute differed or how many bytes matched.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({}…)", &self.0[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(addr: &str, ua: &str) -> FingerprintInputs {
        FingerprintInputs::new(addr, ua)
    }

    #[test]
    fn test_fingerprint_is_deterministic_hex() {
        let a = Fingerprint::from_inputs(&inputs("203.0.113.7", "Mozilla/5.0"), true, true);
        let b = Fingerprint::from_inputs(&inputs("203.0.113.7", "Mozilla/5.0"), true, true);
        assert!(a.matches(&b));
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!a.as_str().contains("203.0.113.7"));
    }

    #[test]
    fn test_fingerprint_differs_by_address() {
        let a = Fingerprint::from_inputs(&inputs("203.0.113.7", "Mozilla/5.0"), true, true);
        let b = Fingerprint::from_inputs(&inputs("203.0.113.8", "Mozilla/5.0"), true, true);
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_disabled_input_is_ignored() {
        let a = Fingerprint::from_inputs(&inputs("203.0.113.7", "Mozilla/5.0"), false, true);
        let b = Fingerprint::from_inputs(&inputs("198.51.100.1", "Mozilla/5.0"), false, true);
        assert!(a.matches(&b));

        let c = Fingerprint::from_inputs(&inputs("203.0.113.7", "curl/8.4"), true, false);
        let d = Fingerprint::from_inputs(&inputs("203.0.113.7", "Mozilla/5.0"), true, false);
        assert!(c.matches(&d));
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let a = Fingerprint::from_inputs(&inputs("a:b", "c"), true, true);
        let b = Fingerprint::from_inputs(&inputs("a", "b:c"), true, true);
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_debug_does_not_print_full_digest() {
        let fp = Fingerprint::from_inputs(&inputs("203.0.113.7", "Mozilla/5.0"), true, true);
        let dbg = format!("{:?}", fp);
        assert!(!dbg.contains(fp.as_str()));
    }
}
