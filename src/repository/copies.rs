//! Copies repository for database operations

use chrono::Utc;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::copy::{BookCopy, CopyStatus, CreateCopy, UpdateCopy},
};

const COPY_COLUMNS: &str =
    "id, book_id, barcode, location, status, notes, acquired_at, created_at, updated_at";

#[derive(Clone)]
pub struct CopiesRepository {
    pool: Pool<Postgres>,
}

impl CopiesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get copy by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>(&format!("SELECT {} FROM copies WHERE id = $1", COPY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", id)))
    }

    /// Get copy by barcode
    pub async fn get_by_barcode(&self, barcode: &str) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>(&format!(
            "SELECT {} FROM copies WHERE barcode = $1",
            COPY_COLUMNS
        ))
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Copy with barcode {} not found", barcode)))
    }

    /// Lock a copy row for the rest of the transaction
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>(&format!(
            "SELECT {} FROM copies WHERE id = $1 FOR UPDATE",
            COPY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", id)))
    }

    /// List copies of a book
    pub async fn list_by_book(&self, book_id: i32) -> AppResult<Vec<BookCopy>> {
        let copies = sqlx::query_as::<_, BookCopy>(&format!(
            "SELECT {} FROM copies WHERE book_id = $1 ORDER BY barcode",
            COPY_COLUMNS
        ))
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(copies)
    }

    pub async fn count_by_status(&self, book_id: i32, statuses: &[CopyStatus]) -> AppResult<i64> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM copies WHERE book_id = $1 AND status = ANY($2)",
        )
        .bind(book_id)
        .bind(&statuses)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn barcode_exists(&self, barcode: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM copies WHERE barcode = $1)")
            .bind(barcode)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Create a new available copy
    pub async fn create(&self, book_id: i32, copy: &CreateCopy) -> AppResult<BookCopy> {
        let created = sqlx::query_as::<_, BookCopy>(&format!(
            r#"
            INSERT INTO copies (book_id, barcode, location, status, notes, acquired_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            COPY_COLUMNS
        ))
        .bind(book_id)
        .bind(&copy.barcode)
        .bind(&copy.location)
        .bind(CopyStatus::Available)
        .bind(&copy.notes)
        .bind(copy.acquired_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: i32, copy: &UpdateCopy) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>(&format!(
            r#"
            UPDATE copies SET
                location = COALESCE($2, location),
                notes = COALESCE($3, notes),
                updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            COPY_COLUMNS
        ))
        .bind(id)
        .bind(&copy.location)
        .bind(&copy.notes)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", id)))
    }

    /// Set a copy's status; callers enforce the transition table
    pub async fn set_status(&self, conn: &mut PgConnection, id: i32, status: CopyStatus) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>(&format!(
            "UPDATE copies SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            COPY_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", id)))
    }

    pub async fn delete(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM copies WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Copy with id {} not found", id)));
        }
        Ok(())
    }
}
