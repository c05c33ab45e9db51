//! Login and MFA endpoints.
//!
//! Flow Overview:
//! 1) `POST /v1/admin/login` checks the password and returns either a session
//!    token or, when MFA is enabled, a short-lived challenge token.
//! 2) `POST /v1/admin/mfa/verify` exchanges the challenge and a TOTP code for a session.
//! 3) `POST /v1/admin/mfa/setup` + `POST /v1/admin/mfa/confirm` enroll a new
//!    authenticator; nothing is stored until a code from it has been verified.
//!
//! Every outcome of these flows is appended to the audit chain without ever
//! blocking the response.

use axum::{extract::Extension, http::HeaderMap, response::IntoResponse, Json};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{extract_bearer_token, extract_client_ip, ErrorBody};
use crate::{
    audit::{actions, AuditChain, AuditEvent},
    rbac::Role,
    session::{AuthError, Authenticator, IssuedToken, LoginOutcome, MfaEnrollment},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub account: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MfaVerifyRequest {
    pub mfa_token: String,
    pub code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MfaConfirmRequest {
    pub secret: String,
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminSummary {
    pub id: String,
    pub name: String,
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub mfa_required: bool,
    /// Session token, present when no second factor is needed.
    pub token: Option<String>,
    /// Challenge token for `/v1/admin/mfa/verify`.
    pub mfa_token: Option<String>,
    pub expires_at: i64,
    pub admin: AdminSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: i64,
    pub admin: AdminSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MfaConfirmResponse {
    pub mfa_enabled: bool,
}

fn summary(issued: &IssuedToken) -> AdminSummary {
    AdminSummary {
        id: issued.claims.principal_id.clone(),
        name: issued.claims.display_name.clone(),
        roles: issued.claims.roles.clone(),
    }
}

fn failure_details(err: &AuthError) -> serde_json::Value {
    json!({ "reason": err.kind() })
}

/// Principal recorded for logins that never authenticated anyone.
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

/// Longest prefix of a submitted account name written to the audit chain.
pub const MAX_RECORDED_ACCOUNT_BYTES: usize = 128;

fn recorded_account(account: &str) -> &str {
    if account.len() <= MAX_RECORDED_ACCOUNT_BYTES {
        return account;
    }
    let mut end = MAX_RECORDED_ACCOUNT_BYTES;
    while !account.is_char_boundary(end) {
        end -= 1;
    }
    &account[..end]
}

#[utoipa::path(
    post,
    path = "/v1/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session or MFA challenge issued.", body = LoginResponse),
        (status = 401, description = "Invalid credentials.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    audit: Extension<Arc<AuditChain>>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    let ip = extract_client_ip(&headers);
    let account = request.account.trim();

    match auth.login(account, &request.password).await {
        Ok(outcome) => {
            let (issued, mfa_required) = match &outcome {
                LoginOutcome::Session(issued) => (issued, false),
                LoginOutcome::MfaChallenge(issued) => (issued, true),
            };
            audit
                .record(
                    AuditEvent::new(
                        &issued.claims.principal_id,
                        &issued.claims.display_name,
                        actions::ADMIN_LOGIN,
                        "admin",
                        &issued.claims.principal_id,
                    )
                    .with_source_ip(ip)
                    .with_details(json!({ "mfa_required": mfa_required })),
                )
                .await;

            let (token, mfa_token) = if mfa_required {
                (None, Some(issued.token.clone()))
            } else {
                (Some(issued.token.clone()), None)
            };
            Json(LoginResponse {
                mfa_required,
                token,
                mfa_token,
                expires_at: issued.claims.exp,
                admin: summary(issued),
            })
            .into_response()
        }
        Err(err) => {
            let submitted = recorded_account(account);
            audit
                .record(
                    AuditEvent::new(
                        ANONYMOUS_PRINCIPAL,
                        ANONYMOUS_PRINCIPAL,
                        actions::ADMIN_LOGIN,
                        "admin",
                        submitted,
                    )
                    .with_success(false)
                    .with_source_ip(ip)
                    .with_details(json!({ "reason": err.kind(), "account": submitted })),
                )
                .await;
            err.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/mfa/verify",
    request_body = MfaVerifyRequest,
    responses(
        (status = 200, description = "Second factor accepted, session issued.", body = SessionResponse),
        (status = 401, description = "Invalid or expired challenge, or wrong code.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn mfa_verify(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    audit: Extension<Arc<AuditChain>>,
    Json(request): Json<MfaVerifyRequest>,
) -> impl IntoResponse {
    let ip = extract_client_ip(&headers);

    match auth.verify_mfa(&request.mfa_token, request.code.trim()).await {
        Ok(issued) => {
            audit
                .record(
                    AuditEvent::new(
                        &issued.claims.principal_id,
                        &issued.claims.display_name,
                        actions::ADMIN_MFA_VERIFY,
                        "admin",
                        &issued.claims.principal_id,
                    )
                    .with_source_ip(ip),
                )
                .await;
            Json(SessionResponse {
                token: issued.token.clone(),
                expires_at: issued.claims.exp,
                admin: summary(&issued),
            })
            .into_response()
        }
        Err(err) => {
            // Only a signature-checked challenge names a principal worth recording.
            if let Ok(claims) = auth.authenticate(&request.mfa_token) {
                audit
                    .record(
                        AuditEvent::new(
                            &claims.principal_id,
                            &claims.display_name,
                            actions::ADMIN_MFA_VERIFY,
                            "admin",
                            &claims.principal_id,
                        )
                        .with_success(false)
                        .with_source_ip(ip)
                        .with_details(failure_details(&err)),
                    )
                    .await;
            }
            err.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/mfa/setup",
    responses(
        (status = 200, description = "New secret and provisioning URI; not stored yet.", body = MfaEnrollment),
        (status = 401, description = "Missing, invalid or expired token.", body = ErrorBody),
        (status = 403, description = "Session has not completed MFA.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn mfa_setup(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
) -> impl IntoResponse {
    let token = match extract_bearer_token(&headers) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    match auth.setup_mfa(&token) {
        Ok(enrollment) => Json(enrollment).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/mfa/confirm",
    request_body = MfaConfirmRequest,
    responses(
        (status = 200, description = "MFA enabled.", body = MfaConfirmResponse),
        (status = 401, description = "Invalid token or wrong code.", body = ErrorBody),
        (status = 403, description = "Session has not completed MFA.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn mfa_confirm(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    audit: Extension<Arc<AuditChain>>,
    Json(request): Json<MfaConfirmRequest>,
) -> impl IntoResponse {
    let token = match extract_bearer_token(&headers) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    let ip = extract_client_ip(&headers);
    let secret = SecretString::from(request.secret.trim().to_string());

    match auth.confirm_mfa(&token, &secret, request.code.trim()).await {
        Ok(claims) => {
            audit
                .record(
                    AuditEvent::new(
                        &claims.principal_id,
                        &claims.display_name,
                        actions::ADMIN_MFA_ENABLE,
                        "admin",
                        &claims.principal_id,
                    )
                    .with_source_ip(ip),
                )
                .await;
            Json(MfaConfirmResponse { mfa_enabled: true }).into_response()
        }
        Err(err) => {
            if let Ok(claims) = auth.authenticate(&token) {
                audit
                    .record(
                        AuditEvent::new(
                            &claims.principal_id,
                            &claims.display_name,
                            actions::ADMIN_MFA_ENABLE,
                            "admin",
                            &claims.principal_id,
                        )
                        .with_success(false)
                        .with_source_ip(ip)
                        .with_details(failure_details(&err)),
                    )
                    .await;
            }
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_accounts_are_recorded_whole() {
        assert_eq!(recorded_account("nightshift"), "nightshift");
        assert_eq!(recorded_account(""), "");
    }

    #[test]
    fn long_accounts_are_cut_on_a_char_boundary() {
        let ascii = "x".repeat(MAX_RECORDED_ACCOUNT_BYTES * 4);
        assert_eq!(recorded_account(&ascii).len(), MAX_RECORDED_ACCOUNT_BYTES);

        // 127 ASCII bytes then a 3-byte char straddling the limit.
        let straddling = format!("{}€tail", "a".repeat(MAX_RECORDED_ACCOUNT_BYTES - 1));
        let cut = recorded_account(&straddling);
        assert_eq!(cut.len(), MAX_RECORDED_ACCOUNT_BYTES - 1);
        assert!(cut.chars().all(|ch| ch == 'a'));
    }
}
