//! PKCE (RFC 7636) and the CSRF `state` parameter.

use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{OAuthError, OAuthResult};

/// How long a `state` parameter stays valid.
pub const STATE_VALIDITY: Duration = Duration::from_secs(600);

/// Entropy of the PKCE verifier before encoding.
const VERIFIER_ENTROPY_BYTES: usize = 64;

/// Entropy of the `state` parameter before encoding.
const STATE_ENTROPY_BYTES: usize = 32;

/// A PKCE verifier/challenge pair. The method is always `S256`.
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// The secret the client keeps for the token exchange
    pub verifier: String,
    /// `BASE64URL(SHA-256(verifier))`, sent with the authorization request
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair from 64 random bytes.
    #[must_use]
    pub fn generate() -> Self {
        let mut entropy = [0u8; VERIFIER_ENTROPY_BYTES];
        rand::thread_rng().fill_bytes(&mut entropy);
        let verifier = URL_SAFE_NO_PAD.encode(entropy);
        let challenge = Self::challenge_for(&verifier);
        Self { verifier, challenge }
    }

    /// Compute the S256 challenge for a verifier.
    #[must_use]
    pub fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// The challenge method name sent to the server.
    #[must_use]
    pub const fn method() -> &'static str {
        "S256"
    }
}

/// The `state` parameter of one authorization round-trip.
///
/// Compared in constant time and valid for ten minutes.
#[derive(Debug, Clone)]
pub struct AuthorizationState {
    value: String,
    issued_at: Instant,
}

impl AuthorizationState {
    /// Generate a fresh state from 32 random bytes.
    #[must_use]
    pub fn generate() -> Self {
        let mut entropy = [0u8; STATE_ENTROPY_BYTES];
        rand::thread_rng().fill_bytes(&mut entropy);
        Self {
            value: URL_SAFE_NO_PAD.encode(entropy),
            issued_at: Instant::now(),
        }
    }

    /// The value to place in the authorization URL.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Validate the state echoed by the callback.
    ///
    /// # Errors
    ///
    /// [`OAuthError::StateExpired`] past the validity window,
    /// [`OAuthError::StateMismatch`] when the values differ. Comparison is
    /// constant-time.
    pub fn validate(&self, callback_state: &str) -> OAuthResult<()> {
        if self.issued_at.elapsed() > STATE_VALIDITY {
            return Err(OAuthError::StateExpired);
        }

        let ours = self.value.as_bytes();
        let theirs = callback_state.as_bytes();
        // ct_eq requires equal lengths; a length difference is already a
        // mismatch and leaks nothing useful.
        if ours.len() != theirs.len() || ours.ct_eq(theirs).unwrap_u8() != 1 {
            return Err(OAuthError::StateMismatch);
        }
        Ok(())
    }

    #[cfg(test)]
    fn with_issued_at(value: String, issued_at: Instant) -> Self {
        Self { value, issued_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn verifier_length_is_in_rfc_bounds() {
        let pair = PkcePair::generate();
        // 64 bytes base64url-encode to 86 characters
        assert_eq!(pair.verifier.len(), 86);
        assert!((43..=128).contains(&pair.verifier.len()));
    }

    #[test]
    fn challenge_is_base64url_sha256_of_verifier() {
        // RFC 7636 appendix B test vector
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            PkcePair::challenge_for(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn generated_pairs_are_unique_and_consistent() {
        let a = PkcePair::generate();
        let b = PkcePair::generate();
        assert_ne!(a.verifier, b.verifier);
        assert_eq!(a.challenge, PkcePair::challenge_for(&a.verifier));
    }

    #[test]
    fn state_round_trip_validates() {
        let state = AuthorizationState::generate();
        assert!(state.validate(state.value()).is_ok());
        assert!(matches!(
            state.validate("tampered"),
            Err(OAuthError::StateMismatch)
        ));
    }

    #[test]
    fn state_expires_after_validity_window() {
        let stale = AuthorizationState::with_issued_at(
            "abc".to_string(),
            Instant::now() - (STATE_VALIDITY + Duration::from_secs(1)),
        );
        assert!(matches!(
            stale.validate("abc"),
            Err(OAuthError::StateExpired)
        ));
    }
}
