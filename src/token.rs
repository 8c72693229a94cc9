//! Access-token derivation and verification.
//!
//! Two credential kinds are accepted as the gating path segment: a static
//! configured token, and a rotating pseudo-UUID derived from a secret and
//! the current one-second time bucket. Verification of the rotating token
//! accepts the current and the previous bucket's value, tolerating up to
//! one second of clock skew between issuer and verifier.
//!
//! This is a shared-secret rolling password, not a standard freshness or
//! replay protection scheme. Callers only see [`TokenVerifier`], so the
//! scheme can be swapped out without touching them.

use crate::config::Config;
use chrono::Utc;
use sha2::{Digest, Sha256};

/// Derive the rotating token for a given one-second bucket.
///
/// The digest is hashed twice (hex of the first round feeds the second) and
/// the first 32 hex characters are shaped like a UUID.
pub fn derive_token(secret: &str, bucket: i64) -> String {
    let first = Sha256::digest(format!("{secret}{bucket}").as_bytes());
    let second = Sha256::digest(hex::encode(first).as_bytes());
    let hex = hex::encode(second);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Verifies path-segment credentials against the configured static token
/// and/or rotating secret.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    static_token: Option<String>,
    secret: Option<String>,
}

impl TokenVerifier {
    pub fn new(static_token: Option<String>, secret: Option<String>) -> Self {
        Self {
            static_token,
            secret,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.token.clone(), config.secret.clone())
    }

    /// True when at least one credential source is configured.
    pub fn has_credentials(&self) -> bool {
        self.static_token.is_some() || self.secret.is_some()
    }

    /// The token to advertise in generated links: the static token when
    /// configured, otherwise the rotating token for the current bucket.
    pub fn primary_token(&self) -> Option<String> {
        self.static_token
            .clone()
            .or_else(|| self.current_token())
    }

    /// The rotating token for the current bucket, when a secret is set.
    pub fn current_token(&self) -> Option<String> {
        self.secret
            .as_deref()
            .map(|s| derive_token(s, Utc::now().timestamp()))
    }

    /// Verify a candidate token at the current time.
    pub fn verify(&self, candidate: &str) -> bool {
        self.verify_at(candidate, Utc::now().timestamp())
    }

    /// Verify a candidate token at an explicit verification time. Accepts
    /// the static token, and the rotating token for `now` or `now - 1`.
    pub fn verify_at(&self, candidate: &str, now: i64) -> bool {
        if candidate.is_empty() {
            return false;
        }
        if self.static_token.as_deref() == Some(candidate) {
            return true;
        }
        if let Some(secret) = self.secret.as_deref() {
            return derive_token(secret, now) == candidate
                || derive_token(secret, now - 1) == candidate;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_token_shape() {
        let token = derive_token("secret", 1_700_000_000);
        assert_eq!(token.len(), 36);
        let parts: Vec<&str> = token.split('-').collect();
        assert_eq!(
            parts.iter().map(|p| p.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(token
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn test_derive_token_deterministic() {
        assert_eq!(
            derive_token("secret", 1_700_000_000),
            derive_token("secret", 1_700_000_000)
        );
        assert_ne!(
            derive_token("secret", 1_700_000_000),
            derive_token("secret", 1_700_000_001)
        );
        assert_ne!(
            derive_token("secret", 1_700_000_000),
            derive_token("other", 1_700_000_000)
        );
    }

    #[test]
    fn test_two_second_acceptance_window() {
        let verifier = TokenVerifier::new(None, Some("secret".to_string()));
        let t = 1_700_000_000;
        let token = derive_token("secret", t);

        assert!(verifier.verify_at(&token, t));
        assert!(verifier.verify_at(&token, t + 1));
        assert!(!verifier.verify_at(&token, t + 2));
        assert!(!verifier.verify_at(&token, t - 1));
    }

    #[test]
    fn test_static_token() {
        let verifier = TokenVerifier::new(Some("my-token".to_string()), None);
        assert!(verifier.verify_at("my-token", 0));
        assert!(!verifier.verify_at("other", 0));
        assert!(!verifier.verify_at("", 0));
        assert_eq!(verifier.primary_token().as_deref(), Some("my-token"));
    }

    #[test]
    fn test_both_credentials() {
        let verifier =
            TokenVerifier::new(Some("static".to_string()), Some("secret".to_string()));
        let t = 1_700_000_000;
        assert!(verifier.verify_at("static", t));
        assert!(verifier.verify_at(&derive_token("secret", t), t));
        // Static token wins for advertised links
        assert_eq!(verifier.primary_token().as_deref(), Some("static"));
    }

    #[test]
    fn test_no_credentials() {
        let verifier = TokenVerifier::new(None, None);
        assert!(!verifier.has_credentials());
        assert!(!verifier.verify_at("anything", 0));
        assert!(verifier.primary_token().is_none());
    }
}
