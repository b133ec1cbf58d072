//! Reservation (hold queue) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

text_enum! {
    /// Reservation lifecycle: Pending -> Ready -> Fulfilled, or closed early
    ReservationStatus {
        Pending => "pending",
        Ready => "ready",
        Fulfilled => "fulfilled",
        Cancelled => "cancelled",
        Expired => "expired",
    }
}

impl ReservationStatus {
    pub fn is_open(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Ready)
    }
}

/// Reservation model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    /// Copy held for the member once the reservation is ready
    pub copy_id: Option<i32>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub hold_until: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Copy set aside for this reservation while it waits for pickup
    pub fn held_copy(&self) -> Option<i32> {
        self.copy_id.filter(|_| self.status == ReservationStatus::Ready)
    }
}

/// Reservation with its place in the queue
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReservationDetails {
    pub id: i32,
    pub book_id: i32,
    pub title: String,
    pub user_id: i32,
    pub copy_id: Option<i32>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub hold_until: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    /// 1-based position among pending reservations for the book
    #[sqlx(default)]
    pub queue_position: Option<i64>,
}

/// Place reservation request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReservation {
    pub book_id: i32,
    /// Staff may reserve on behalf of a member; defaults to the caller
    pub user_id: Option<i32>,
}

/// Query parameters for a member's reservations
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct UserReservationsQuery {
    /// Include fulfilled, cancelled and expired reservations
    #[serde(default)]
    pub include_closed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(status: ReservationStatus, copy_id: Option<i32>) -> Reservation {
        Reservation {
            id: 1,
            book_id: 3,
            user_id: 5,
            copy_id,
            status,
            created_at: Utc::now(),
            ready_at: None,
            hold_until: None,
            closed_at: None,
        }
    }

    #[test]
    fn only_ready_reservations_hold_a_copy() {
        assert_eq!(reservation(ReservationStatus::Ready, Some(9)).held_copy(), Some(9));
        assert_eq!(reservation(ReservationStatus::Pending, None).held_copy(), None);
        assert_eq!(reservation(ReservationStatus::Fulfilled, Some(9)).held_copy(), None);
        assert_eq!(reservation(ReservationStatus::Expired, Some(9)).held_copy(), None);
    }

    #[test]
    fn open_statuses() {
        assert!(ReservationStatus::Pending.is_open());
        assert!(ReservationStatus::Ready.is_open());
        assert!(!ReservationStatus::Cancelled.is_open());
    }
}
