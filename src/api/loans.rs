//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::{
    error::AppResult,
    models::{
        audit::{AuditAction, NewAuditEntry},
        fine::{AssessDamage, Fine},
        loan::{CreateLoan, LoanDetails, LoanQuery, ReturnLoan, UserLoansQuery},
        user::{Rights, RightsDomain},
    },
};

use super::{AuthenticatedUser, ClientIp, LoanPage, PaginatedResponse};

/// List loans
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans", body = LoanPage),
        (status = 403, description = "Insufficient rights")
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<LoanPage>> {
    claims.require_read_circulation()?;

    let (loans, total) = state.services.loans.search(&query).await?;
    Ok(Json(PaginatedResponse::new(loans, total, query.page, query.per_page)))
}

/// Get loans for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        UserLoansQuery
    ),
    responses(
        (status = 200, description = "User's loans", body = Vec<LoanDetails>),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<UserLoansQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_self_or(user_id, RightsDomain::Circulation, Rights::Read)?;

    let loans = state
        .services
        .loans
        .list_for_user(user_id, query.include_returned)
        .await?;
    Ok(Json(loans))
}

/// Get a loan
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get(id).await?;
    claims.require_self_or(loan.user_id, RightsDomain::Circulation, Rights::Read)?;
    Ok(Json(loan))
}

/// Check a copy out to a member
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = LoanDetails),
        (status = 400, description = "Neither copy_id nor barcode given"),
        (status = 404, description = "User or copy not found"),
        (status = 422, description = "Copy unavailable or borrower limits reached")
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    claims.require_write_circulation()?;

    let loan = state.services.loans.checkout(&request).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::Checkout, "loan", Some(loan.id))
                .with_details(json!({
                    "user_id": loan.user_id,
                    "copy_id": loan.copy_id,
                    "barcode": loan.barcode,
                    "due_at": loan.due_at,
                    "force": request.force,
                }))
                .with_ip(ip),
        )
        .await;

    Ok((StatusCode::CREATED, Json(loan)))
}

async fn audit_return(
    state: &crate::AppState,
    actor: i32,
    ip: Option<String>,
    loan: &LoanDetails,
    damaged: bool,
) {
    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(actor), AuditAction::Return, "loan", Some(loan.id))
                .with_details(json!({
                    "copy_id": loan.copy_id,
                    "barcode": loan.barcode,
                    "damaged": damaged,
                }))
                .with_ip(ip),
        )
        .await;
}

/// Return a borrowed copy
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body(content = ReturnLoan, description = "Optional return options"),
    responses(
        (status = 200, description = "Copy returned", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Loan already returned")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
    body: Option<Json<ReturnLoan>>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_write_circulation()?;

    let Json(request) = body.unwrap_or_default();
    let loan = state.services.loans.return_loan(id, request.damaged).await?;

    audit_return(&state, claims.user_id, ip, &loan, request.damaged).await;
    Ok(Json(loan))
}

/// Return a copy by scanning its barcode
#[utoipa::path(
    post,
    path = "/loans/barcode/{barcode}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("barcode" = String, Path, description = "Copy barcode")
    ),
    request_body(content = ReturnLoan, description = "Optional return options"),
    responses(
        (status = 200, description = "Copy returned", body = LoanDetails),
        (status = 404, description = "Copy not found or not on loan")
    )
)]
pub async fn return_by_barcode(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(barcode): Path<String>,
    body: Option<Json<ReturnLoan>>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_write_circulation()?;

    let Json(request) = body.unwrap_or_default();
    let loan = state
        .services
        .loans
        .return_by_barcode(&barcode, request.damaged)
        .await?;

    audit_return(&state, claims.user_id, ip, &loan, request.damaged).await;
    Ok(Json(loan))
}

/// Renew a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/renew",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan renewed", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Renewal not allowed")
    )
)]
pub async fn renew_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let existing = state.services.loans.get(id).await?;
    claims.require_self_or(existing.user_id, RightsDomain::Circulation, Rights::Write)?;

    let loan = state.services.loans.renew(id).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::Renew, "loan", Some(id))
                .with_details(json!({
                    "previous_due_at": existing.due_at,
                    "due_at": loan.due_at,
                    "renewals": loan.renewals,
                }))
                .with_ip(ip),
        )
        .await;

    Ok(Json(loan))
}

/// Declare a borrowed copy lost
#[utoipa::path(
    post,
    path = "/loans/{id}/lost",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan closed as lost", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Loan already returned")
    )
)]
pub async fn mark_lost(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_write_circulation()?;

    let loan = state.services.loans.mark_lost(id).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::MarkLost, "loan", Some(id))
                .with_details(json!({ "copy_id": loan.copy_id, "barcode": loan.barcode }))
                .with_ip(ip),
        )
        .await;

    Ok(Json(loan))
}

/// Charge a damage fine on a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/damage-fine",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = AssessDamage,
    responses(
        (status = 201, description = "Fine assessed", body = Fine),
        (status = 400, description = "Amount must be positive"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn assess_damage(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
    Json(request): Json<AssessDamage>,
) -> AppResult<(StatusCode, Json<Fine>)> {
    claims.require_write_fines()?;

    let fine = state.services.fines.assess_damage(id, request.amount).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::AssessFine, "fine", Some(fine.id))
                .with_details(json!({ "loan_id": id, "amount": fine.amount, "reason": fine.reason }))
                .with_ip(ip),
        )
        .await;

    Ok((StatusCode::CREATED, Json(fine)))
}
