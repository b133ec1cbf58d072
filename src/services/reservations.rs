//! Reservation queue and copy hand-off

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    mediator::{DomainEvent, Mediator},
    models::{
        copy::CopyStatus,
        reservation::{Reservation, ReservationDetails, ReservationStatus},
        user::UserStatus,
    },
    repository::Repository,
    services::policy::CirculationPolicy,
};

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
    policy: CirculationPolicy,
    mediator: Arc<Mediator>,
}

impl ReservationsService {
    pub fn new(repository: Repository, policy: CirculationPolicy, mediator: Arc<Mediator>) -> Self {
        Self {
            repository,
            policy,
            mediator,
        }
    }

    pub async fn get(&self, id: i32) -> AppResult<ReservationDetails> {
        self.repository.reservations.get_details(id).await
    }

    pub async fn list_for_user(&self, user_id: i32, include_closed: bool) -> AppResult<Vec<ReservationDetails>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.reservations.list_for_user(user_id, !include_closed).await
    }

    /// Pending reservations for a book, first in line first
    pub async fn queue(&self, book_id: i32) -> AppResult<Vec<ReservationDetails>> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.reservations.queue_for_book(book_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn place(&self, user_id: i32, book_id: i32) -> AppResult<ReservationDetails> {
        self.repository.books.get_by_id(book_id).await?;

        let user = self.repository.users.get_by_id(user_id).await?;
        if user.status != UserStatus::Active {
            return Err(AppError::BusinessRule(format!("User account is {}", user.status)));
        }

        if self
            .repository
            .reservations
            .open_for_user_book(user_id, book_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "You already have an open reservation for this book".to_string(),
            ));
        }

        if self.repository.loans.user_has_active_for_book(user_id, book_id).await? {
            return Err(AppError::BusinessRule(
                "You are currently borrowing a copy of this book".to_string(),
            ));
        }

        let available = self
            .repository
            .copies
            .count_by_status(book_id, &[CopyStatus::Available])
            .await?;
        if available > 0 {
            return Err(AppError::BusinessRule(
                "Copies are available, borrow directly".to_string(),
            ));
        }

        let mut tx = self.repository.begin().await?;
        let reservation = self
            .repository
            .reservations
            .create(&mut tx, user_id, book_id)
            .await
            .map_err(|e| e.on_unique_violation("You already have an open reservation for this book"))?;
        tx.commit().await?;

        tracing::info!(reservation_id = reservation.id, user_id, book_id, "Reservation placed");
        self.repository.reservations.get_details(reservation.id).await
    }

    /// Cancel a pending or ready reservation; a held copy goes to the next in line
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: i32) -> AppResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.repository.begin().await?;

        let reservation = self.repository.reservations.lock(&mut tx, id).await?;
        if !reservation.status.is_open() {
            return Err(AppError::BusinessRule(format!(
                "Only pending or ready reservations can be cancelled (reservation is {})",
                reservation.status
            )));
        }

        let cancelled = self
            .repository
            .reservations
            .close(&mut tx, id, ReservationStatus::Cancelled, now)
            .await?;
        let next = self.release_held_copy(&mut tx, &reservation, now).await?;
        tx.commit().await?;

        tracing::info!(reservation_id = id, "Reservation cancelled");
        if let Some(next) = next {
            self.publish_ready(&next).await;
        }
        Ok(cancelled)
    }

    /// Expire ready reservations whose hold lapsed before `now`. Returns how many expired.
    #[tracing::instrument(skip(self))]
    pub async fn expire_holds(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let ids = self.repository.reservations.lapsed_holds(now).await?;
        let mut expired = 0;

        for id in ids {
            match self.expire_one(id, now).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(reservation_id = id, "Failed to expire hold: {}", e),
            }
        }
        Ok(expired)
    }

    async fn expire_one(&self, id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tx = self.repository.begin().await?;
        let reservation = self.repository.reservations.lock(&mut tx, id).await?;

        // Re-check under the lock: the member may have borrowed in the meantime
        let lapsed = reservation.status == ReservationStatus::Ready
            && reservation.hold_until.map(|h| h < now).unwrap_or(false);
        if !lapsed {
            return Ok(false);
        }

        self.repository
            .reservations
            .close(&mut tx, id, ReservationStatus::Expired, now)
            .await?;
        let next = self.release_held_copy(&mut tx, &reservation, now).await?;
        tx.commit().await?;

        tracing::info!(reservation_id = id, user_id = reservation.user_id, "Reservation hold expired");

        let title = self.book_title(reservation.book_id).await;
        self.mediator
            .publish(DomainEvent::ReservationExpired {
                reservation_id: id,
                user_id: reservation.user_id,
                title,
            })
            .await;
        if let Some(next) = next {
            self.publish_ready(&next).await;
        }
        Ok(true)
    }

    /// Hand on the copy a ready reservation was holding.
    ///
    /// `reservation` is the row as read before it was closed.
    pub async fn release_held_copy(
        &self,
        conn: &mut PgConnection,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>> {
        let Some(copy_id) = reservation.held_copy() else {
            return Ok(None);
        };
        let copy = self.repository.copies.lock(conn, copy_id).await?;
        if copy.status != CopyStatus::Reserved {
            return Ok(None);
        }
        self.hand_off_copy(conn, copy_id, copy.book_id, now).await
    }

    /// Give a freed copy to the oldest pending reservation, or shelve it.
    ///
    /// Returns the reservation that became ready, if any.
    pub async fn hand_off_copy(
        &self,
        conn: &mut PgConnection,
        copy_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>> {
        match self.repository.reservations.next_pending(conn, book_id).await? {
            Some(next) => {
                let ready = self
                    .repository
                    .reservations
                    .mark_ready(conn, next.id, copy_id, now, self.policy.hold_until(now))
                    .await?;
                self.repository
                    .copies
                    .set_status(conn, copy_id, CopyStatus::Reserved)
                    .await?;
                tracing::info!(reservation_id = ready.id, copy_id, "Copy held for reservation");
                Ok(Some(ready))
            }
            None => {
                self.repository
                    .copies
                    .set_status(conn, copy_id, CopyStatus::Available)
                    .await?;
                Ok(None)
            }
        }
    }

    /// Notify subscribers that a reservation is waiting for pickup
    pub async fn publish_ready(&self, reservation: &Reservation) {
        let Some(hold_until) = reservation.hold_until else {
            return;
        };
        let title = self.book_title(reservation.book_id).await;
        self.mediator
            .publish(DomainEvent::ReservationReady {
                reservation_id: reservation.id,
                user_id: reservation.user_id,
                title,
                hold_until,
            })
            .await;
    }

    async fn book_title(&self, book_id: i32) -> String {
        match self.repository.books.get_by_id(book_id).await {
            Ok(book) => book.title,
            Err(e) => {
                tracing::warn!(book_id, "Failed to load book title: {}", e);
                format!("book #{}", book_id)
            }
        }
    }
}
