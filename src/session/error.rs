use thiserror::Error;

use super::token::TokenError;

/// Rejections returned by the authentication and authorization flows.
///
/// Messages are deliberately terse: callers never learn which field was wrong.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("MFA verification required")]
    MfaRequired,
    #[error("invalid MFA code")]
    MfaInvalidCode,
    #[error("forbidden")]
    Forbidden,
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::TokenInvalid => "token_invalid",
            Self::TokenExpired => "token_expired",
            Self::MfaRequired => "mfa_required",
            Self::MfaInvalidCode => "mfa_invalid_code",
            Self::Forbidden => "forbidden",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            _ => Self::TokenInvalid,
        }
    }
}
