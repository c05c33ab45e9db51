//! RFC 6238 time-based one-time passwords (HMAC-SHA1, 6 digits).
//!
//! Secrets are 160 random bits, exchanged as unpadded RFC 4648 Base32.
//! `verify` accepts the code of the current step and of `window` steps on each
//! side, so a code stays acceptable for up to `(2 * window + 1) * step`
//! seconds. The window is configuration, not a constant.

pub mod provisioning;

pub use provisioning::provisioning_uri;

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::warn;

pub const CODE_DIGITS: usize = 6;
pub const DEFAULT_TIME_STEP_SECONDS: u64 = 30;
pub const DEFAULT_WINDOW: u64 = 1;

/// TOTP parameters loaded at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TotpConfig {
    time_step: u64,
    window: u64,
}

impl TotpConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            time_step: DEFAULT_TIME_STEP_SECONDS,
            window: DEFAULT_WINDOW,
        }
    }

    /// A zero step is meaningless; it is clamped to one second.
    #[must_use]
    pub fn with_time_step(mut self, seconds: u64) -> Self {
        self.time_step = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_window(mut self, steps: u64) -> Self {
        self.window = steps;
        self
    }

    #[must_use]
    pub fn time_step(&self) -> u64 {
        self.time_step
    }

    #[must_use]
    pub fn window(&self) -> u64 {
        self.window
    }
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless TOTP engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct Totp {
    config: TotpConfig,
}

impl Totp {
    #[must_use]
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TotpConfig {
        &self.config
    }

    /// Generate a fresh Base32 secret (160 bits from the OS CSPRNG).
    #[must_use]
    pub fn generate_secret() -> SecretString {
        SecretString::from(Secret::generate_secret().to_encoded().to_string())
    }

    /// Derive the code for the step containing `timestamp` (Unix seconds).
    ///
    /// Returns `None` when the secret is not valid Base32.
    #[must_use]
    pub fn derive_code(&self, secret: &SecretString, timestamp: u64) -> Option<String> {
        let generator = self.generator(decode_secret(secret)?);
        Some(generator.generate(timestamp))
    }

    /// Check `candidate` against the steps around `now` (Unix seconds).
    ///
    /// Anything that is not exactly six ASCII digits is rejected before any
    /// HMAC is computed.
    #[must_use]
    pub fn verify(&self, secret: &SecretString, candidate: &str, now: i64) -> bool {
        if !is_well_formed(candidate) {
            return false;
        }

        let Some(key) = decode_secret(secret) else {
            warn!("TOTP secret is not valid base32");
            return false;
        };

        let Ok(now) = u64::try_from(now) else {
            return false;
        };

        let step = self.config.time_step;
        let current = now / step;
        let first = current.saturating_sub(self.config.window);
        let last = current.saturating_add(self.config.window);
        let generator = self.generator(key);

        // Scan the whole window so timing does not reveal which step matched.
        let mut matched = false;
        for counter in first..=last {
            let expected = generator.generate(counter.saturating_mul(step));
            matched |= bool::from(expected.as_bytes().ct_eq(candidate.as_bytes()));
        }
        matched
    }

    /// Skew is zero: the window scan in `verify` owns drift tolerance.
    fn generator(&self, key: Vec<u8>) -> TOTP {
        TOTP::new_unchecked(
            Algorithm::SHA1,
            CODE_DIGITS,
            0,
            self.config.time_step,
            key,
            None,
            String::new(),
        )
    }
}

fn is_well_formed(candidate: &str) -> bool {
    candidate.len() == CODE_DIGITS && candidate.bytes().all(|byte| byte.is_ascii_digit())
}

fn decode_secret(secret: &SecretString) -> Option<Vec<u8>> {
    let encoded = secret.expose_secret().trim().to_ascii_uppercase();
    if encoded.is_empty() {
        return None;
    }
    Secret::Encoded(encoded).to_bytes().ok()
}
