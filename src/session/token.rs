//! Compact HS256 claim tokens (`header.claims.signature`, base64url).
//!
//! Session and challenge tokens share one shape; `mfaVerified` tells them
//! apart. Tokens are self-contained and never stored server-side.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use crate::rbac::Role;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "HS256";

/// Keys shorter than this are refused at startup.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    Format,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("signing key must be at least {MIN_SECRET_LEN} bytes")]
    WeakKey,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims carried by session and challenge tokens. Field names match the
/// dashboard's decoder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SessionClaims {
    #[serde(rename = "adminId")]
    pub principal_id: String,
    #[serde(rename = "adminName")]
    pub display_name: String,
    pub roles: Vec<Role>,
    #[serde(rename = "mfaVerified")]
    pub mfa_verified: bool,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds. Valid up to and including this instant.
    pub exp: i64,
    pub jti: String,
}

/// Signs and validates claim tokens with a shared HMAC key.
#[derive(Clone)]
pub struct TokenSigner {
    key: Arc<SecretSlice<u8>>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl TokenSigner {
    /// # Errors
    /// Returns `WeakKey` when the key is shorter than [`MIN_SECRET_LEN`].
    pub fn new(key: &[u8]) -> Result<Self, TokenError> {
        if key.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakKey);
        }
        Ok(Self {
            key: Arc::new(SecretSlice::from(key.to_vec())),
        })
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.key.expose_secret()).map_err(|_| TokenError::WeakKey)
    }

    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn sign(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify signature then expiry, returning the claims.
    ///
    /// # Errors
    /// `Expired` when `now_unix_seconds > exp`; any structural or signature
    /// problem otherwise.
    pub fn validate(
        &self,
        token: &str,
        now_unix_seconds: i64,
    ) -> Result<SessionClaims, TokenError> {
        let mut parts = token.trim().split('.');
        let header_b64 = parts.next().ok_or(TokenError::Format)?;
        let claims_b64 = parts.next().ok_or(TokenError::Format)?;
        let sig_b64 = parts.next().ok_or(TokenError::Format)?;
        if parts.next().is_some() {
            return Err(TokenError::Format);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: SessionClaims = b64d_json(claims_b64)?;
        if now_unix_seconds > claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
