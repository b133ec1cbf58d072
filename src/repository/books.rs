//! Books repository for database operations

use chrono::Utc;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, BookShort, CreateBook, UpdateBook},
};

use super::page_bounds;

const BOOK_COLUMNS: &str = "id, isbn, title, author, publisher, publication_year, language, subject, \
                            replacement_cost, created_at, updated_at";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    pub async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND id != COALESCE($2, 0))",
        )
        .bind(isbn)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookQuery, isbn: Option<String>) {
        builder.push(" WHERE TRUE");
        if let Some(ref title) = query.title {
            builder
                .push(" AND LOWER(b.title) LIKE ")
                .push_bind(format!("%{}%", title.to_lowercase()));
        }
        if let Some(ref author) = query.author {
            builder
                .push(" AND LOWER(b.author) LIKE ")
                .push_bind(format!("%{}%", author.to_lowercase()));
        }
        if let Some(isbn) = isbn {
            builder.push(" AND b.isbn = ").push_bind(isbn);
        }
        if let Some(ref q) = query.q {
            let pattern = format!("%{}%", q.to_lowercase());
            builder
                .push(" AND (LOWER(b.title) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(COALESCE(b.author, '')) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(COALESCE(b.subject, '')) LIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    /// Search books with copy counts
    pub async fn search(&self, query: &BookQuery, isbn: Option<String>) -> AppResult<(Vec<BookShort>, i64)> {
        let (_, per_page, offset) = page_bounds(query.page, query.per_page);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books b");
        Self::push_filters(&mut count, query, isbn.clone());
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            r#"
            SELECT b.id, b.isbn, b.title, b.author, b.publication_year,
                   (SELECT COUNT(*) FROM copies c WHERE c.book_id = b.id) as nb_copies,
                   (SELECT COUNT(*) FROM copies c WHERE c.book_id = b.id AND c.status = 'available') as nb_available
            FROM books b
            "#,
        );
        Self::push_filters(&mut select, query, isbn);
        select
            .push(" ORDER BY b.title, b.id LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let books = select.build_query_as::<BookShort>().fetch_all(&self.pool).await?;
        Ok((books, total))
    }

    /// Create a book; `isbn` is already normalized
    pub async fn create(&self, book: &CreateBook, isbn: Option<&str>) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (isbn, title, author, publisher, publication_year, language, subject,
                               replacement_cost, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(isbn)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(&book.language)
        .bind(&book.subject)
        .bind(book.replacement_cost)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: i32, book: &UpdateBook, isbn: Option<&str>) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET
                isbn = COALESCE($2, isbn),
                title = COALESCE($3, title),
                author = COALESCE($4, author),
                publisher = COALESCE($5, publisher),
                publication_year = COALESCE($6, publication_year),
                language = COALESCE($7, language),
                subject = COALESCE($8, subject),
                replacement_cost = COALESCE($9, replacement_cost),
                updated_at = $10
            WHERE id = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .bind(isbn)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(&book.language)
        .bind(&book.subject)
        .bind(book.replacement_cost)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book; copies go with it
    pub async fn delete(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }
}
