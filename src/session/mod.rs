//! Session and MFA escalation state machine.
//!
//! State lives entirely in signed tokens: no token is `Unauthenticated`, a
//! token with `mfaVerified=false` is a pending MFA challenge, and one with
//! `mfaVerified=true` is a usable session. Every transition takes a token plus
//! input and returns a new token or an [`AuthError`].

pub mod error;
pub mod replay;
pub mod service;
pub mod token;

pub use error::AuthError;
pub use replay::{ChallengeDecision, ChallengeLedger, MemoryChallengeLedger, NoopChallengeLedger};
pub use service::{Authenticator, IssuedToken, LoginOutcome, MfaEnrollment};
pub use token::{SessionClaims, TokenError, TokenSigner};

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 8 * 60 * 60;
pub const DEFAULT_CHALLENGE_TTL_SECONDS: i64 = 5 * 60;
pub const DEFAULT_TOTP_ISSUER: &str = "Pitboss Admin";

/// Session policy, built once at startup.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    challenge_ttl_seconds: i64,
    totp_issuer: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_session_ttl(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_challenge_ttl(mut self, seconds: i64) -> Self {
        self.challenge_ttl_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.totp_issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn challenge_ttl_seconds(&self) -> i64 {
        self.challenge_ttl_seconds
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}
