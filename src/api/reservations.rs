//! Reservation (hold queue) endpoints

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
        reservation::{CreateReservation, Reservation, ReservationDetails, UserReservationsQuery},
        user::{Rights, RightsDomain},
    },
};

use super::{AuthenticatedUser, ClientIp};

/// Place a reservation on a book
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = CreateReservation,
    responses(
        (status = 201, description = "Reservation placed", body = ReservationDetails),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "Member already holds an open reservation for this book"),
        (status = 422, description = "Reservation not allowed")
    )
)]
pub async fn place_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Json(request): Json<CreateReservation>,
) -> AppResult<(StatusCode, Json<ReservationDetails>)> {
    let user_id = request.user_id.unwrap_or(claims.user_id);
    claims.require_self_or(user_id, RightsDomain::Circulation, Rights::Write)?;

    let reservation = state
        .services
        .reservations
        .place(user_id, request.book_id)
        .await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(
                Some(claims.user_id),
                AuditAction::Reserve,
                "reservation",
                Some(reservation.id),
            )
            .with_details(json!({
                "book_id": reservation.book_id,
                "user_id": reservation.user_id,
                "status": reservation.status,
            }))
            .with_ip(ip),
        )
        .await;

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Get a reservation
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation details", body = ReservationDetails),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.get(id).await?;
    claims.require_self_or(reservation.user_id, RightsDomain::Circulation, Rights::Read)?;
    Ok(Json(reservation))
}

/// Cancel a reservation
#[utoipa::path(
    delete,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 404, description = "Reservation not found"),
        (status = 422, description = "Reservation already closed")
    )
)]
pub async fn cancel_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    let existing = state.services.reservations.get(id).await?;
    claims.require_self_or(existing.user_id, RightsDomain::Circulation, Rights::Write)?;

    let reservation = state.services.reservations.cancel(id).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(
                Some(claims.user_id),
                AuditAction::CancelReservation,
                "reservation",
                Some(id),
            )
            .with_details(json!({
                "book_id": reservation.book_id,
                "user_id": reservation.user_id,
                "released_copy_id": reservation.copy_id,
            }))
            .with_ip(ip),
        )
        .await;

    Ok(Json(reservation))
}

/// Get reservations for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        UserReservationsQuery
    ),
    responses(
        (status = 200, description = "User's reservations", body = Vec<ReservationDetails>)
    )
)]
pub async fn get_user_reservations(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<UserReservationsQuery>,
) -> AppResult<Json<Vec<ReservationDetails>>> {
    claims.require_self_or(user_id, RightsDomain::Circulation, Rights::Read)?;

    let reservations = state
        .services
        .reservations
        .list_for_user(user_id, query.include_closed)
        .await?;
    Ok(Json(reservations))
}

/// Pending reservations for a book, in queue order
#[utoipa::path(
    get,
    path = "/books/{id}/queue",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Reservation queue", body = Vec<ReservationDetails>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn book_queue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Vec<ReservationDetails>>> {
    claims.require_read_circulation()?;

    let queue = state.services.reservations.queue(book_id).await?;
    Ok(Json(queue))
}
