//! Operator access to the audit trail. Both endpoints require `ops:monitor`.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use super::{extract_bearer_token, ErrorBody};
use crate::{
    audit::{AuditChain, AuditFilter, AuditRecord, IntegrityReport, Page},
    rbac::Permission,
    session::{AuthError, Authenticator},
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub principal_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// Unix milliseconds, inclusive.
    pub start_time: Option<i64>,
    /// Unix milliseconds, inclusive.
    pub end_time: Option<i64>,
}

impl AuditLogQuery {
    fn into_parts(self) -> (AuditFilter, Page) {
        let page = Page::new(
            self.page.unwrap_or(1),
            self.page_size
                .unwrap_or(crate::audit::store::DEFAULT_PAGE_SIZE),
        );
        let filter = AuditFilter {
            principal_id: self.principal_id,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            start_time: self.start_time,
            end_time: self.end_time,
        };
        (filter, page)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogPage {
    pub page: u32,
    pub page_size: u32,
    pub records: Vec<AuditRecord>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyQuery {
    /// First sequence id to check; defaults to the start of the chain.
    pub from: Option<i64>,
    /// Last sequence id to check; defaults to the head.
    pub to: Option<i64>,
}

fn authorize(headers: &HeaderMap, auth: &Authenticator) -> Result<(), AuthError> {
    let token = extract_bearer_token(headers)?;
    auth.authorize(&token, Permission::OpsMonitor).map(|_| ())
}

#[utoipa::path(
    get,
    path = "/v1/admin/audit-logs",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Matching audit records, newest first.", body = AuditLogPage),
        (status = 401, description = "Missing, invalid or expired token.", body = ErrorBody),
        (status = 403, description = "Missing ops:monitor or MFA.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "audit"
)]
pub async fn list_audit_logs(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    audit: Extension<Arc<AuditChain>>,
    Query(query): Query<AuditLogQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &auth) {
        return err.into_response();
    }

    let (filter, page) = query.into_parts();
    match audit.query(&filter, page).await {
        Ok(records) => Json(AuditLogPage {
            page: page.number(),
            page_size: page.size(),
            records,
        })
        .into_response(),
        Err(err) => {
            error!("Failed to query audit log: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/audit-logs/verify",
    params(VerifyQuery),
    responses(
        (status = 200, description = "Integrity report; a broken chain is reported, not an error.", body = IntegrityReport),
        (status = 401, description = "Missing, invalid or expired token.", body = ErrorBody),
        (status = 403, description = "Missing ops:monitor or MFA.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "audit"
)]
pub async fn verify_audit_logs(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    audit: Extension<Arc<AuditChain>>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &auth) {
        return err.into_response();
    }

    match audit
        .verify_integrity(query.from.unwrap_or(1), query.to)
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(err) => {
            error!("Failed to verify audit chain: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
