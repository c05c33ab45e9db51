//! Single-use bookkeeping for MFA challenge tokens.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeDecision {
    /// First redemption of this challenge.
    Accepted,
    /// The challenge was already exchanged for a session.
    Replayed,
}

pub trait ChallengeLedger: Send + Sync {
    /// Mark `jti` as redeemed. `expires_at` bounds how long it must be remembered.
    fn redeem(&self, jti: &str, expires_at: i64, now: i64) -> ChallengeDecision;
}

/// Challenges may be redeemed any number of times until they expire.
#[derive(Clone, Debug)]
pub struct NoopChallengeLedger;

impl ChallengeLedger for NoopChallengeLedger {
    fn redeem(&self, _jti: &str, _expires_at: i64, _now: i64) -> ChallengeDecision {
        ChallengeDecision::Accepted
    }
}

/// Process-local ledger. Entries are dropped once their challenge has expired.
#[derive(Debug, Default)]
pub struct MemoryChallengeLedger {
    redeemed: Mutex<HashMap<String, i64>>,
}

impl MemoryChallengeLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.redeemed.lock().map(|map| map.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChallengeLedger for MemoryChallengeLedger {
    fn redeem(&self, jti: &str, expires_at: i64, now: i64) -> ChallengeDecision {
        // A poisoned lock means another redemption panicked mid-update; keep going with its data.
        let mut redeemed = match self.redeemed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        redeemed.retain(|_, exp| *exp >= now);

        if redeemed.contains_key(jti) {
            return ChallengeDecision::Replayed;
        }
        redeemed.insert(jti.to_string(), expires_at);
        ChallengeDecision::Accepted
    }
}
