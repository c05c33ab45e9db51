use axum::{extract::Extension, http::HeaderMap, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{extract_bearer_token, ErrorBody};
use crate::{
    rbac::{Permission, Role},
    session::Authenticator,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub name: String,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub mfa_verified: bool,
    pub expires_at: i64,
}

#[utoipa::path(
    get,
    path = "/v1/admin/me",
    responses(
        (status = 200, description = "The caller and their effective permissions.", body = MeResponse),
        (status = 401, description = "Missing, invalid or expired token.", body = ErrorBody),
        (status = 403, description = "Session has not completed MFA.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, auth: Extension<Arc<Authenticator>>) -> impl IntoResponse {
    let claims = match extract_bearer_token(&headers)
        .and_then(|token| auth.require_mfa_verified(&token))
    {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    let permissions = auth.effective_permissions(&claims);
    Json(MeResponse {
        id: claims.principal_id,
        name: claims.display_name,
        roles: claims.roles,
        permissions,
        mfa_verified: claims.mfa_verified,
        expires_at: claims.exp,
    })
    .into_response()
}
