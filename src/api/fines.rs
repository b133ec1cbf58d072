//! Fine endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        audit::{AuditAction, NewAuditEntry},
        fine::{Fine, FineBalance, FineQuery, FineStatus, PayFine, WaiveFine},
        user::{Rights, RightsDomain},
    },
};

use super::{AuthenticatedUser, ClientIp, FinePage, PaginatedResponse};

/// Query parameters for a member's fines
#[derive(Debug, Deserialize, IntoParams)]
pub struct UserFinesQuery {
    pub status: Option<FineStatus>,
}

/// A member's fines with their outstanding balance
#[derive(Debug, Serialize, ToSchema)]
pub struct UserFines {
    pub fines: Vec<Fine>,
    #[serde(flatten)]
    pub balance: FineBalance,
}

/// List fines
#[utoipa::path(
    get,
    path = "/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(FineQuery),
    responses(
        (status = 200, description = "Fines", body = FinePage),
        (status = 403, description = "Insufficient rights")
    )
)]
pub async fn list_fines(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<FineQuery>,
) -> AppResult<Json<FinePage>> {
    claims.require_read_fines()?;

    let (fines, total) = state.services.fines.list(&query).await?;
    Ok(Json(PaginatedResponse::new(fines, total, query.page, query.per_page)))
}

/// Get a fine
#[utoipa::path(
    get,
    path = "/fines/{id}",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Fine", body = Fine),
        (status = 404, description = "Fine not found")
    )
)]
pub async fn get_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Fine>> {
    let fine = state.services.fines.get(id).await?;
    claims.require_self_or(fine.user_id, RightsDomain::Fines, Rights::Read)?;
    Ok(Json(fine))
}

/// Get fines for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        UserFinesQuery
    ),
    responses(
        (status = 200, description = "User's fines and outstanding balance", body = UserFines)
    )
)]
pub async fn get_user_fines(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<UserFinesQuery>,
) -> AppResult<Json<UserFines>> {
    claims.require_self_or(user_id, RightsDomain::Fines, Rights::Read)?;

    let fines = state.services.fines.list_for_user(user_id, query.status).await?;
    let outstanding = state.services.fines.outstanding_total(user_id).await?;

    Ok(Json(UserFines {
        fines,
        balance: FineBalance { user_id, outstanding },
    }))
}

/// Record a payment against a fine
#[utoipa::path(
    post,
    path = "/fines/{id}/pay",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    request_body = PayFine,
    responses(
        (status = 200, description = "Payment recorded", body = Fine),
        (status = 400, description = "Invalid amount"),
        (status = 404, description = "Fine not found"),
        (status = 422, description = "Fine is not unpaid")
    )
)]
pub async fn pay_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
    Json(request): Json<PayFine>,
) -> AppResult<Json<Fine>> {
    claims.require_write_fines()?;

    let fine = state.services.fines.pay(id, request.amount).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::PayFine, "fine", Some(id))
                .with_details(json!({
                    "amount": request.amount,
                    "amount_paid": fine.amount_paid,
                    "status": fine.status,
                }))
                .with_ip(ip),
        )
        .await;

    Ok(Json(fine))
}

/// Waive a fine
#[utoipa::path(
    post,
    path = "/fines/{id}/waive",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    request_body = WaiveFine,
    responses(
        (status = 200, description = "Fine waived", body = Fine),
        (status = 400, description = "Missing reason"),
        (status = 404, description = "Fine not found"),
        (status = 422, description = "Fine is not unpaid")
    )
)]
pub async fn waive_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
    Json(request): Json<WaiveFine>,
) -> AppResult<Json<Fine>> {
    claims.require_write_fines()?;
    request.validate()?;

    let fine = state
        .services
        .fines
        .waive(id, claims.user_id, &request.reason)
        .await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::WaiveFine, "fine", Some(id))
                .with_details(json!({ "amount": fine.amount, "reason": request.reason }))
                .with_ip(ip),
        )
        .await;

    Ok(Json(fine))
}
