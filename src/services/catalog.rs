//! Catalog management service: books and their physical copies

use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{is_valid_isbn, normalize_isbn, Book, BookQuery, BookShort, CreateBook, UpdateBook},
        copy::{BookCopy, CopyStatus, CreateCopy, UpdateCopy},
        reservation::ReservationStatus,
    },
    repository::Repository,
};

/// Statuses that tie a copy to a member
const IN_CIRCULATION: [CopyStatus; 2] = [CopyStatus::Borrowed, CopyStatus::Reserved];

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

/// Normalize an optional ISBN and check its digits. Blank input means no ISBN.
fn checked_isbn(raw: Option<&str>) -> AppResult<Option<String>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let isbn = normalize_isbn(raw);
    if isbn.is_empty() {
        return Ok(None);
    }
    if !is_valid_isbn(&isbn) {
        return Err(AppError::Validation(format!("Invalid ISBN: {}", raw)));
    }
    Ok(Some(isbn))
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    // Books

    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<BookShort>, i64)> {
        let isbn = query
            .isbn
            .as_deref()
            .map(normalize_isbn)
            .filter(|isbn| !isbn.is_empty());
        self.repository.books.search(query, isbn).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    #[tracing::instrument(skip(self, book), fields(title = %book.title))]
    pub async fn create_book(&self, book: &CreateBook) -> AppResult<Book> {
        book.validate()?;
        let isbn = checked_isbn(book.isbn.as_deref())?;
        if let Some(ref isbn) = isbn {
            if self.repository.books.isbn_exists(isbn, None).await? {
                return Err(AppError::Conflict(format!("A book with ISBN {} already exists", isbn)));
            }
        }
        let created = self.repository.books.create(book, isbn.as_deref()).await?;
        tracing::info!(book_id = created.id, "Book created");
        Ok(created)
    }

    #[tracing::instrument(skip(self, book))]
    pub async fn update_book(&self, id: i32, book: &UpdateBook) -> AppResult<Book> {
        book.validate()?;
        let isbn = checked_isbn(book.isbn.as_deref())?;
        if let Some(ref isbn) = isbn {
            if self.repository.books.isbn_exists(isbn, Some(id)).await? {
                return Err(AppError::Conflict(format!("A book with ISBN {} already exists", isbn)));
            }
        }
        self.repository.books.update(id, book, isbn.as_deref()).await
    }

    /// Delete a book with its copies and reservations
    #[tracing::instrument(skip(self))]
    pub async fn delete_book(&self, id: i32, force: bool) -> AppResult<()> {
        self.repository.books.get_by_id(id).await?;

        let in_circulation = self.repository.copies.count_by_status(id, &IN_CIRCULATION).await?;
        if in_circulation > 0 {
            if !force {
                return Err(AppError::BusinessRule(format!(
                    "Book has {} copies on loan or on hold",
                    in_circulation
                )));
            }
            tracing::warn!(book_id = id, in_circulation, "Forcing deletion of a book in circulation");
        }

        let mut tx = self.repository.begin().await?;
        self.repository.books.delete(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }

    // Copies

    pub async fn list_copies(&self, book_id: i32) -> AppResult<Vec<BookCopy>> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.copies.list_by_book(book_id).await
    }

    pub async fn get_copy(&self, id: i32) -> AppResult<BookCopy> {
        self.repository.copies.get_by_id(id).await
    }

    pub async fn get_copy_by_barcode(&self, barcode: &str) -> AppResult<BookCopy> {
        self.repository.copies.get_by_barcode(barcode.trim()).await
    }

    #[tracing::instrument(skip(self, copy), fields(barcode = %copy.barcode))]
    pub async fn create_copy(&self, book_id: i32, copy: &CreateCopy) -> AppResult<BookCopy> {
        copy.validate()?;
        self.repository.books.get_by_id(book_id).await?;
        if self.repository.copies.barcode_exists(&copy.barcode).await? {
            return Err(AppError::Conflict(format!(
                "A copy with barcode {} already exists",
                copy.barcode
            )));
        }
        let created = self.repository.copies.create(book_id, copy).await?;
        tracing::info!(copy_id = created.id, book_id, "Copy created");
        Ok(created)
    }

    pub async fn update_copy(&self, id: i32, copy: &UpdateCopy) -> AppResult<BookCopy> {
        self.repository.copies.update(id, copy).await
    }

    /// Manual status change by staff. Returns the previous status and the updated copy.
    #[tracing::instrument(skip(self))]
    pub async fn change_status(&self, id: i32, status: CopyStatus) -> AppResult<(CopyStatus, BookCopy)> {
        let mut tx = self.repository.begin().await?;
        let copy = self.repository.copies.lock(&mut tx, id).await?;
        let from = copy.status;

        check_manual_transition(from, status)?;

        let updated = self.repository.copies.set_status(&mut tx, id, status).await?;
        tx.commit().await?;

        tracing::info!(copy_id = id, from = %from, to = %status, "Copy status changed");
        Ok((from, updated))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_copy(&self, id: i32, force: bool) -> AppResult<()> {
        let mut tx = self.repository.begin().await?;
        let copy = self.repository.copies.lock(&mut tx, id).await?;
        if copy.status.is_circulation_managed() {
            if !force {
                return Err(AppError::BusinessRule(format!(
                    "Copy {} is {} and cannot be deleted",
                    copy.barcode, copy.status
                )));
            }
            tracing::warn!(copy_id = id, status = %copy.status, "Forcing deletion of a copy in circulation");
        }

        // A hold on a vanishing copy would keep blocking other borrowers
        if let Some(hold) = self.repository.reservations.ready_for_copy(&mut tx, id).await? {
            self.repository
                .reservations
                .close(&mut tx, hold.id, ReservationStatus::Cancelled, Utc::now())
                .await?;
            tracing::warn!(reservation_id = hold.id, copy_id = id, "Hold cancelled with its copy");
        }

        self.repository.copies.delete(&mut tx, id).await?;
        tx.commit().await?;
        tracing::info!(copy_id = id, "Copy deleted");
        Ok(())
    }
}

/// Rules for a status change made outside circulation
fn check_manual_transition(from: CopyStatus, to: CopyStatus) -> AppResult<()> {
    if from == to {
        return Err(AppError::BusinessRule(format!("Copy is already {}", to)));
    }
    if from.is_circulation_managed() || to.is_circulation_managed() {
        return Err(AppError::BusinessRule(format!(
            "Cannot change status from {} to {} outside circulation",
            from, to
        )));
    }
    if !from.can_transition_to(to) {
        return Err(AppError::BusinessRule(format!(
            "Illegal status transition from {} to {}",
            from, to
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_isbn_is_absent() {
        assert_eq!(checked_isbn(None).unwrap(), None);
        assert_eq!(checked_isbn(Some(" - ")).unwrap(), None);
    }

    #[test]
    fn isbn_is_normalized_before_checking() {
        assert_eq!(
            checked_isbn(Some("978-0-306-40615-7")).unwrap(),
            Some("9780306406157".to_string())
        );
        assert!(matches!(
            checked_isbn(Some("978-0-306-40615-8")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn manual_transitions_avoid_circulation_statuses() {
        use CopyStatus::*;
        assert!(check_manual_transition(Available, Damaged).is_ok());
        assert!(check_manual_transition(Damaged, Lost).is_ok());
        assert!(check_manual_transition(Lost, Available).is_ok());

        assert!(check_manual_transition(Available, Borrowed).is_err());
        assert!(check_manual_transition(Reserved, Available).is_err());
        assert!(check_manual_transition(Borrowed, Lost).is_err());
        assert!(check_manual_transition(Damaged, Damaged).is_err());
    }
}
