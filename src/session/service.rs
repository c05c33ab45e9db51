use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    error::AuthError,
    replay::{ChallengeDecision, ChallengeLedger, MemoryChallengeLedger},
    token::{SessionClaims, TokenSigner},
    AuthConfig,
};
use crate::{
    clock::Clock,
    identity::{password, IdentityStore, Principal},
    rbac::{Permission, RolePermissionMap},
    totp::{provisioning_uri, Totp},
};

/// A signed token together with the claims it carries.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub claims: SessionClaims,
}

#[derive(Clone, Debug)]
pub enum LoginOutcome {
    /// MFA is not enabled: the session is usable immediately.
    Session(IssuedToken),
    /// Password accepted, second factor pending.
    MfaChallenge(IssuedToken),
}

/// Freshly generated, not yet persisted TOTP enrollment.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct MfaEnrollment {
    #[serde(serialize_with = "expose")]
    #[schema(value_type = String)]
    pub secret: SecretString,
    pub provisioning_uri: String,
}

fn expose<S: serde::Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

pub struct Authenticator {
    identities: Arc<dyn IdentityStore>,
    permissions: Arc<RolePermissionMap>,
    signer: TokenSigner,
    totp: Totp,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    challenges: Arc<dyn ChallengeLedger>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .field("totp", &self.totp)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Challenges are single-use by default; see [`Self::with_challenge_ledger`].
    #[must_use]
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        permissions: Arc<RolePermissionMap>,
        signer: TokenSigner,
        totp: Totp,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identities,
            permissions,
            signer,
            totp,
            config,
            clock,
            challenges: Arc::new(MemoryChallengeLedger::new()),
        }
    }

    #[must_use]
    pub fn with_challenge_ledger(mut self, challenges: Arc<dyn ChallengeLedger>) -> Self {
        self.challenges = challenges;
        self
    }

    #[must_use]
    pub fn permissions(&self) -> &RolePermissionMap {
        &self.permissions
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// First factor. Unknown account, wrong password and deactivated principal
    /// all fail with the same `InvalidCredentials`.
    ///
    /// # Errors
    /// `InvalidCredentials`, or `Internal` when the store is unreachable.
    #[instrument(skip(self, password))]
    pub async fn login(&self, account: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let principal = self
            .identities
            .find_by_account(account)
            .await
            .map_err(AuthError::Internal)?;

        let password_ok = verify_password_blocking(password, principal.as_ref()).await?;
        let Some(principal) = principal else {
            debug!("login for unknown account");
            return Err(AuthError::InvalidCredentials);
        };
        if !password_ok {
            debug!(principal = %principal.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }
        if !principal.is_active() {
            warn!(principal = %principal.id, "login attempt for deactivated principal");
            return Err(AuthError::InvalidCredentials);
        }

        if let Err(err) = self
            .identities
            .record_login(&principal.id, self.clock.now_millis())
            .await
        {
            warn!(principal = %principal.id, "failed to record login: {err:#}");
        }

        if principal.mfa_enabled {
            let challenge = self.issue(&principal, false, self.config.challenge_ttl_seconds())?;
            info!(principal = %principal.id, "password verified, MFA challenge issued");
            Ok(LoginOutcome::MfaChallenge(challenge))
        } else {
            let session = self.issue(&principal, true, self.config.session_ttl_seconds())?;
            info!(principal = %principal.id, "session issued");
            Ok(LoginOutcome::Session(session))
        }
    }

    /// Second factor: exchange a challenge token and a TOTP code for a session.
    ///
    /// # Errors
    /// `TokenInvalid`/`TokenExpired` for a bad, expired, already redeemed or
    /// non-challenge token, `MfaInvalidCode` when the code does not match.
    #[instrument(skip_all)]
    pub async fn verify_mfa(
        &self,
        challenge_token: &str,
        code: &str,
    ) -> Result<IssuedToken, AuthError> {
        let now = self.clock.now_unix();
        let claims = self.signer.validate(challenge_token, now)?;
        if claims.mfa_verified {
            return Err(AuthError::TokenInvalid);
        }

        let principal = self
            .identities
            .find_by_id(&claims.principal_id)
            .await
            .map_err(AuthError::Internal)?
            .filter(Principal::is_active)
            .ok_or(AuthError::TokenInvalid)?;

        let secret = match (&principal.mfa_secret, principal.mfa_enabled) {
            (Some(secret), true) => secret,
            _ => {
                warn!(principal = %principal.id, "challenge presented but MFA is not enabled");
                return Err(AuthError::TokenInvalid);
            }
        };

        if !self.totp.verify(secret, code, now) {
            info!(principal = %principal.id, "MFA code rejected");
            return Err(AuthError::MfaInvalidCode);
        }

        if self.challenges.redeem(&claims.jti, claims.exp, now) == ChallengeDecision::Replayed {
            warn!(principal = %principal.id, "MFA challenge replayed");
            return Err(AuthError::TokenInvalid);
        }

        let session = self.issue(&principal, true, self.config.session_ttl_seconds())?;
        info!(principal = %principal.id, "MFA verified, session issued");
        Ok(session)
    }

    /// Validate signature and expiry only.
    ///
    /// # Errors
    /// `TokenInvalid` or `TokenExpired`.
    pub fn authenticate(&self, token: &str) -> Result<SessionClaims, AuthError> {
        Ok(self.signer.validate(token, self.clock.now_unix())?)
    }

    /// Guard for sensitive operations that need a fully verified session.
    ///
    /// # Errors
    /// `TokenInvalid`/`TokenExpired`, or `MfaRequired` for a challenge token.
    pub fn require_mfa_verified(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let claims = self.authenticate(token)?;
        if !claims.mfa_verified {
            return Err(AuthError::MfaRequired);
        }
        Ok(claims)
    }

    /// Reusable permission guard.
    ///
    /// A pending challenge never authorizes anything, even though it is
    /// signed with the same key.
    ///
    /// # Errors
    /// `TokenInvalid`/`TokenExpired`, `MfaRequired`, or `Forbidden`.
    pub fn authorize(
        &self,
        token: &str,
        required: Permission,
    ) -> Result<SessionClaims, AuthError> {
        let claims = self.require_mfa_verified(token)?;
        if !self.permissions.has_permission(&claims.roles, required) {
            debug!(principal = %claims.principal_id, permission = %required, "permission denied");
            return Err(AuthError::Forbidden);
        }
        Ok(claims)
    }

    /// Start TOTP enrollment. Nothing is persisted until [`Self::confirm_mfa`].
    ///
    /// # Errors
    /// `TokenInvalid`/`TokenExpired` or `MfaRequired`.
    pub fn setup_mfa(&self, token: &str) -> Result<MfaEnrollment, AuthError> {
        let claims = self.require_mfa_verified(token)?;
        let secret = Totp::generate_secret();
        let provisioning_uri = provisioning_uri(
            self.config.totp_issuer(),
            &claims.principal_id,
            &claims.display_name,
            &secret,
        );
        Ok(MfaEnrollment {
            secret,
            provisioning_uri,
        })
    }

    /// Commit enrollment once `code` proves the authenticator holds `secret`.
    ///
    /// # Errors
    /// `TokenInvalid`/`TokenExpired`, `MfaRequired`, `MfaInvalidCode`, or
    /// `Internal` if the store write fails.
    #[instrument(skip(self, token, secret, code))]
    pub async fn confirm_mfa(
        &self,
        token: &str,
        secret: &SecretString,
        code: &str,
    ) -> Result<SessionClaims, AuthError> {
        let claims = self.require_mfa_verified(token)?;
        if !self.totp.verify(secret, code, self.clock.now_unix()) {
            info!(principal = %claims.principal_id, "MFA enrollment code rejected");
            return Err(AuthError::MfaInvalidCode);
        }

        self.identities
            .enable_mfa(&claims.principal_id, secret)
            .await
            .map_err(AuthError::Internal)?;
        info!(principal = %claims.principal_id, "MFA enabled");
        Ok(claims)
    }

    /// Permissions granted by the roles carried in `claims`.
    #[must_use]
    pub fn effective_permissions(&self, claims: &SessionClaims) -> Vec<Permission> {
        self.permissions
            .effective_permissions(&claims.roles)
            .into_iter()
            .collect()
    }

    fn issue(
        &self,
        principal: &Principal,
        mfa_verified: bool,
        ttl_seconds: i64,
    ) -> Result<IssuedToken, AuthError> {
        let iat = self.clock.now_unix();
        let claims = SessionClaims {
            principal_id: principal.id.clone(),
            display_name: principal.display_name.clone(),
            roles: principal.roles.clone(),
            mfa_verified,
            iat,
            exp: iat.saturating_add(ttl_seconds),
            jti: Uuid::new_v4().to_string(),
        };
        let token = self
            .signer
            .sign(&claims)
            .map_err(|err| AuthError::Internal(err.into()))?;
        Ok(IssuedToken { token, claims })
    }
}

/// Argon2 is CPU bound; keep it off the async workers. Unknown accounts are
/// checked against a dummy hash so both paths cost the same.
async fn verify_password_blocking(
    password: &str,
    principal: Option<&Principal>,
) -> Result<bool, AuthError> {
    let password = password.to_string();
    let stored_hash = principal.map(|principal| principal.password_hash.clone());
    tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => password::verify_password(&password, &hash),
        None => password::verify_against_dummy(&password),
    })
    .await
    .map_err(|err| AuthError::Internal(err.into()))
}
