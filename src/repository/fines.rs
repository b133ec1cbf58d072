//! Fines repository for database operations

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::fine::{Fine, FineQuery, FineReason, FineStatus},
};

use super::page_bounds;

const FINE_COLUMNS: &str = "id, loan_id, user_id, amount, amount_paid, reason, status, assessed_at, \
                            settled_at, waived_by, waive_reason";

#[derive(Clone)]
pub struct FinesRepository {
    pool: Pool<Postgres>,
}

impl FinesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Fine> {
        sqlx::query_as::<_, Fine>(&format!("SELECT {} FROM fines WHERE id = $1", FINE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
    }

    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Fine> {
        sqlx::query_as::<_, Fine>(&format!(
            "SELECT {} FROM fines WHERE id = $1 FOR UPDATE",
            FINE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &FineQuery) {
        builder.push(" WHERE TRUE");
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(user_id) = query.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
    }

    pub async fn search(&self, query: &FineQuery) -> AppResult<(Vec<Fine>, i64)> {
        let (_, per_page, offset) = page_bounds(query.page, query.per_page);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM fines");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM fines", FINE_COLUMNS));
        Self::push_filters(&mut select, query);
        select
            .push(" ORDER BY assessed_at DESC, id DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let fines = select.build_query_as::<Fine>().fetch_all(&self.pool).await?;
        Ok((fines, total))
    }

    pub async fn list_for_user(&self, user_id: i32, status: Option<FineStatus>) -> AppResult<Vec<Fine>> {
        let fines = sqlx::query_as::<_, Fine>(&format!(
            "SELECT {} FROM fines WHERE user_id = $1 AND ($2::text IS NULL OR status = $2) ORDER BY assessed_at DESC",
            FINE_COLUMNS
        ))
        .bind(user_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(fines)
    }

    /// Sum of unpaid balances for a user
    pub async fn outstanding_total(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount - amount_paid), 0) FROM fines WHERE user_id = $1 AND status = 'unpaid'",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(total)
    }

    /// Insert a fine. Returns `None` when an overdue fine already exists for the loan.
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        loan_id: i32,
        user_id: i32,
        amount: Decimal,
        reason: FineReason,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Fine>> {
        let fine = sqlx::query_as::<_, Fine>(&format!(
            r#"
            INSERT INTO fines (loan_id, user_id, amount, amount_paid, reason, status, assessed_at)
            VALUES ($1, $2, $3, 0, $4, 'unpaid', $5)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            FINE_COLUMNS
        ))
        .bind(loan_id)
        .bind(user_id)
        .bind(amount)
        .bind(reason)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(fine)
    }

    pub async fn record_payment(
        &self,
        conn: &mut PgConnection,
        id: i32,
        amount_paid: Decimal,
        status: FineStatus,
        settled_at: Option<DateTime<Utc>>,
    ) -> AppResult<Fine> {
        sqlx::query_as::<_, Fine>(&format!(
            "UPDATE fines SET amount_paid = $2, status = $3, settled_at = $4 WHERE id = $1 RETURNING {}",
            FINE_COLUMNS
        ))
        .bind(id)
        .bind(amount_paid)
        .bind(status)
        .bind(settled_at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
    }

    pub async fn waive(
        &self,
        conn: &mut PgConnection,
        id: i32,
        waived_by: i32,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Fine> {
        sqlx::query_as::<_, Fine>(&format!(
            r#"
            UPDATE fines SET status = 'waived', waived_by = $2, waive_reason = $3, settled_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            FINE_COLUMNS
        ))
        .bind(id)
        .bind(waived_by)
        .bind(reason)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
    }
}
