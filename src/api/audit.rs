//! Audit log endpoints

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::audit::{AuditQuery, ChainVerification},
};

use super::{AuditPage, AuthenticatedUser, PaginatedResponse};

/// Search the audit log, newest first
#[utoipa::path(
    get,
    path = "/audit",
    tag = "audit",
    security(("bearer_auth" = [])),
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries", body = AuditPage),
        (status = 403, description = "Insufficient rights")
    )
)]
pub async fn list_audit(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<AuditPage>> {
    claims.require_read_audit()?;

    let (entries, total) = state.services.audit.list(&query).await?;
    Ok(Json(PaginatedResponse::new(entries, total, query.page, query.per_page)))
}

/// Recompute the hash chain and report the first broken link
#[utoipa::path(
    get,
    path = "/audit/verify",
    tag = "audit",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Verification result", body = ChainVerification),
        (status = 403, description = "Insufficient rights")
    )
)]
pub async fn verify_chain(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<ChainVerification>> {
    claims.require_write_audit()?;

    let verification = state.services.audit.verify_chain().await?;
    if !verification.valid {
        tracing::warn!(
            first_broken_id = ?verification.first_broken_id,
            "Audit chain verification failed"
        );
    }
    Ok(Json(verification))
}
