//! Loans repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanDetails, LoanQuery, LoanStatus},
};

use super::page_bounds;

const LOAN_COLUMNS: &str = "id, copy_id, user_id, loaned_at, due_at, returned_at, renewals, status";

const DETAILS_SELECT: &str = r#"
    SELECT l.id, l.copy_id, c.barcode, c.book_id, b.title, l.user_id,
           COALESCE(NULLIF(TRIM(CONCAT(u.firstname, ' ', u.lastname)), ''), u.login) as borrower,
           l.loaned_at, l.due_at, l.returned_at, l.renewals, l.status,
           (l.status = 'active' AND l.due_at < NOW()) as is_overdue
    FROM loans l
    JOIN copies c ON c.id = l.copy_id
    JOIN books b ON b.id = c.book_id
    JOIN users u ON u.id = l.user_id
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Lock a loan row for the rest of the transaction
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Get loan with display details
    pub async fn get_details(&self, id: i32) -> AppResult<LoanDetails> {
        sqlx::query_as::<_, LoanDetails>(&format!("{} WHERE l.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Active loan on a copy, if any
    pub async fn active_for_copy(&self, copy_id: i32) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE copy_id = $1 AND status = 'active'",
            LOAN_COLUMNS
        ))
        .bind(copy_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loan)
    }

    /// Get loans for a user, most recent first
    pub async fn list_for_user(&self, user_id: i32, include_returned: bool) -> AppResult<Vec<LoanDetails>> {
        let loans = sqlx::query_as::<_, LoanDetails>(&format!(
            "{} WHERE l.user_id = $1 AND ($2 OR l.status = 'active') ORDER BY l.due_at DESC",
            DETAILS_SELECT
        ))
        .bind(user_id)
        .bind(include_returned)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &LoanQuery) {
        builder.push(" WHERE TRUE");
        if let Some(status) = query.status {
            builder.push(" AND l.status = ").push_bind(status);
        }
        if let Some(user_id) = query.user_id {
            builder.push(" AND l.user_id = ").push_bind(user_id);
        }
        if query.overdue_only {
            builder.push(" AND l.status = 'active' AND l.due_at < NOW()");
        }
    }

    /// Search loans with pagination
    pub async fn search(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        let (_, per_page, offset) = page_bounds(query.page, query.per_page);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM loans l");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        Self::push_filters(&mut select, query);
        select
            .push(" ORDER BY l.due_at, l.id LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let loans = select.build_query_as::<LoanDetails>().fetch_all(&self.pool).await?;
        Ok((loans, total))
    }

    pub async fn count_active_for_user(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    /// Whether the user currently borrows a copy of this book
    pub async fn user_has_active_for_book(&self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM loans l JOIN copies c ON c.id = l.copy_id
                WHERE l.user_id = $1 AND c.book_id = $2 AND l.status = 'active'
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Create a new active loan
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        copy_id: i32,
        user_id: i32,
        loaned_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            r#"
            INSERT INTO loans (copy_id, user_id, loaned_at, due_at, renewals, status)
            VALUES ($1, $2, $3, $4, 0, 'active')
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(copy_id)
        .bind(user_id)
        .bind(loaned_at)
        .bind(due_at)
        .fetch_one(&mut *conn)
        .await?;
        Ok(loan)
    }

    /// Close an active loan as returned or lost
    pub async fn close(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: LoanStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            "UPDATE loans SET status = $2, returned_at = $3 WHERE id = $1 RETURNING {}",
            LOAN_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Push the due date and count the renewal
    pub async fn renew(&self, conn: &mut PgConnection, id: i32, due_at: DateTime<Utc>) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            "UPDATE loans SET due_at = $2, renewals = renewals + 1 WHERE id = $1 RETURNING {}",
            LOAN_COLUMNS
        ))
        .bind(id)
        .bind(due_at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Active loans due on or before `until`, for reminders
    pub async fn active_due_before(&self, until: DateTime<Utc>) -> AppResult<Vec<LoanDetails>> {
        let loans = sqlx::query_as::<_, LoanDetails>(&format!(
            "{} WHERE l.status = 'active' AND l.due_at <= $1 ORDER BY l.due_at",
            DETAILS_SELECT
        ))
        .bind(until)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }
}
