//! Reservations repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::reservation::{Reservation, ReservationDetails, ReservationStatus},
};

const RESERVATION_COLUMNS: &str =
    "id, book_id, user_id, copy_id, status, created_at, ready_at, hold_until, closed_at";

/// Queue position is only meaningful for pending reservations
const DETAILS_SELECT: &str = r#"
    SELECT r.id, r.book_id, b.title, r.user_id, r.copy_id, r.status,
           r.created_at, r.ready_at, r.hold_until, r.closed_at,
           CASE WHEN r.status = 'pending' THEN (
               SELECT COUNT(*) + 1 FROM reservations r2
               WHERE r2.book_id = r.book_id AND r2.status = 'pending'
                 AND (r2.created_at, r2.id) < (r.created_at, r.id)
           ) END as queue_position
    FROM reservations r
    JOIN books b ON b.id = r.book_id
"#;

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    pub async fn get_details(&self, id: i32) -> AppResult<ReservationDetails> {
        sqlx::query_as::<_, ReservationDetails>(&format!("{} WHERE r.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    pub async fn list_for_user(&self, user_id: i32, open_only: bool) -> AppResult<Vec<ReservationDetails>> {
        let rows = sqlx::query_as::<_, ReservationDetails>(&format!(
            "{} WHERE r.user_id = $1 AND (NOT $2 OR r.status IN ('pending', 'ready')) ORDER BY r.created_at DESC",
            DETAILS_SELECT
        ))
        .bind(user_id)
        .bind(open_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Pending reservations for a book in queue order
    pub async fn queue_for_book(&self, book_id: i32) -> AppResult<Vec<ReservationDetails>> {
        let rows = sqlx::query_as::<_, ReservationDetails>(&format!(
            "{} WHERE r.book_id = $1 AND r.status = 'pending' ORDER BY r.created_at, r.id",
            DETAILS_SELECT
        ))
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// The user's pending or ready reservation for a book
    pub async fn open_for_user_book(&self, user_id: i32, book_id: i32) -> AppResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE user_id = $1 AND book_id = $2 AND status IN ('pending', 'ready')",
            RESERVATION_COLUMNS
        ))
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn create(&self, conn: &mut PgConnection, user_id: i32, book_id: i32) -> AppResult<Reservation> {
        let row = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            INSERT INTO reservations (book_id, user_id, status, created_at)
            VALUES ($1, $2, 'pending', $3)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Oldest pending reservation for a book, locked
    pub async fn next_pending(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE book_id = $1 AND status = 'pending'
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Ready reservation holding a given copy
    pub async fn ready_for_copy(&self, conn: &mut PgConnection, copy_id: i32) -> AppResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE copy_id = $1 AND status = 'ready' FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(copy_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Whether another member has a pending reservation on the book
    pub async fn others_pending(&self, conn: &mut PgConnection, book_id: i32, user_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reservations WHERE book_id = $1 AND user_id != $2 AND status = 'pending')",
        )
        .bind(book_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    /// Copies of the book currently held for other members
    pub async fn ready_held_by_others(&self, conn: &mut PgConnection, book_id: i32, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE book_id = $1 AND user_id != $2 AND status = 'ready'",
        )
        .bind(book_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    pub async fn mark_ready(
        &self,
        conn: &mut PgConnection,
        id: i32,
        copy_id: i32,
        ready_at: DateTime<Utc>,
        hold_until: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            r#"
            UPDATE reservations
            SET status = 'ready', copy_id = $2, ready_at = $3, hold_until = $4
            WHERE id = $1
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .bind(copy_id)
        .bind(ready_at)
        .bind(hold_until)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    /// Close a reservation as fulfilled, cancelled or expired
    pub async fn close(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: ReservationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            "UPDATE reservations SET status = $2, closed_at = $3 WHERE id = $1 RETURNING {}",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    /// Ids of ready reservations whose hold has lapsed
    pub async fn lapsed_holds(&self, now: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let ids = sqlx::query_scalar::<_, i32>(
            "SELECT id FROM reservations WHERE status = 'ready' AND hold_until < $1 ORDER BY hold_until",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
