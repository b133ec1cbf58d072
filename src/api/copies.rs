//! Physical copy endpoints

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
        copy::{BookCopy, ChangeCopyStatus, UpdateCopy},
    },
};

use super::{AuthenticatedUser, ClientIp, ForceParams};

/// Get a copy by ID
#[utoipa::path(
    get,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Copy ID")
    ),
    responses(
        (status = 200, description = "Copy details", body = BookCopy),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn get_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BookCopy>> {
    claims.require_read_catalog()?;

    let copy = state.services.catalog.get_copy(id).await?;
    Ok(Json(copy))
}

/// Look a copy up by barcode
#[utoipa::path(
    get,
    path = "/copies/barcode/{barcode}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("barcode" = String, Path, description = "Copy barcode")
    ),
    responses(
        (status = 200, description = "Copy details", body = BookCopy),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn get_copy_by_barcode(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(barcode): Path<String>,
) -> AppResult<Json<BookCopy>> {
    claims.require_read_catalog()?;

    let copy = state.services.catalog.get_copy_by_barcode(&barcode).await?;
    Ok(Json(copy))
}

/// Update a copy's location and notes
#[utoipa::path(
    put,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Copy ID")
    ),
    request_body = UpdateCopy,
    responses(
        (status = 200, description = "Copy updated", body = BookCopy),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn update_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
    Json(copy): Json<UpdateCopy>,
) -> AppResult<Json<BookCopy>> {
    claims.require_write_catalog()?;

    let updated = state.services.catalog.update_copy(id, &copy).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::Update, "copy", Some(id))
                .with_details(json!({ "location": copy.location, "notes": copy.notes }))
                .with_ip(ip),
        )
        .await;

    Ok(Json(updated))
}

/// Change a copy's status by hand (damaged, lost, back on the shelf)
#[utoipa::path(
    put,
    path = "/copies/{id}/status",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Copy ID")
    ),
    request_body = ChangeCopyStatus,
    responses(
        (status = 200, description = "Status changed", body = BookCopy),
        (status = 404, description = "Copy not found"),
        (status = 422, description = "Transition not allowed")
    )
)]
pub async fn change_copy_status(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
    Json(request): Json<ChangeCopyStatus>,
) -> AppResult<Json<BookCopy>> {
    claims.require_write_catalog()?;

    let (from, updated) = state.services.catalog.change_status(id, request.status).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::StatusChange, "copy", Some(id))
                .with_details(json!({
                    "from": from,
                    "to": updated.status,
                    "reason": request.reason,
                }))
                .with_ip(ip),
        )
        .await;

    Ok(Json(updated))
}

/// Delete a copy
#[utoipa::path(
    delete,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Copy ID"),
        ForceParams
    ),
    responses(
        (status = 204, description = "Copy deleted"),
        (status = 404, description = "Copy not found"),
        (status = 422, description = "Copy is on loan or on hold")
    )
)]
pub async fn delete_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
    Query(params): Query<ForceParams>,
) -> AppResult<StatusCode> {
    claims.require_write_catalog()?;

    state.services.catalog.delete_copy(id, params.force).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::Delete, "copy", Some(id))
                .with_details(json!({ "force": params.force }))
                .with_ip(ip),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}
