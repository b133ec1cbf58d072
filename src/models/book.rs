//! Book (catalog record) model and ISBN helpers

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

static ISBN_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{9}[0-9X]|[0-9]{13})$").expect("valid ISBN regex"));

/// Strip separators and upper-case the check character
pub fn normalize_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Check an already-normalized ISBN-10 or ISBN-13, including its check digit
pub fn is_valid_isbn(isbn: &str) -> bool {
    if !ISBN_SHAPE.is_match(isbn) {
        return false;
    }

    if isbn.len() == 10 {
        let sum: u32 = isbn
            .chars()
            .enumerate()
            .map(|(i, c)| {
                let v = if c == 'X' { 10 } else { c.to_digit(10).unwrap_or(0) };
                v * (10 - i as u32)
            })
            .sum();
        sum % 11 == 0
    } else {
        let sum: u32 = isbn
            .chars()
            .enumerate()
            .map(|(i, c)| {
                let v = c.to_digit(10).unwrap_or(0);
                if i % 2 == 0 { v } else { v * 3 }
            })
            .sum();
        sum % 10 == 0
    }
}

/// Full book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub isbn: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    /// ISO 639-1 language code
    pub language: Option<String>,
    pub subject: Option<String>,
    /// Charged when a borrowed copy is lost
    pub replacement_cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Book with copy counts, for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub isbn: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub publication_year: Option<i32>,
    pub nb_copies: i64,
    pub nb_available: i64,
}

/// Book search parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    /// Free text search across title, author and subject
    pub q: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    pub isbn: Option<String>,
    #[validate(length(min = 1, max = 500, message = "Title is required"))]
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 1400, max = 2100, message = "Invalid publication year"))]
    pub publication_year: Option<i32>,
    #[validate(length(min = 2, max = 5, message = "Language code must be 2-5 characters"))]
    pub language: Option<String>,
    pub subject: Option<String>,
    pub replacement_cost: Option<Decimal>,
}

/// Update book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    pub isbn: Option<String>,
    #[validate(length(min = 1, max = 500, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 1400, max = 2100, message = "Invalid publication year"))]
    pub publication_year: Option<i32>,
    #[validate(length(min = 2, max = 5, message = "Language code must be 2-5 characters"))]
    pub language: Option<String>,
    pub subject: Option<String>,
    pub replacement_cost: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators() {
        assert_eq!(normalize_isbn("978-0-306-40615-7"), "9780306406157");
        assert_eq!(normalize_isbn(" 0 306 40615 x"), "030640615X");
    }

    #[test]
    fn validates_check_digits() {
        assert!(is_valid_isbn("9780306406157"));
        assert!(!is_valid_isbn("9780306406158"));
        assert!(is_valid_isbn("0306406152"));
        assert!(is_valid_isbn("080442957X"));
        assert!(!is_valid_isbn("0306406153"));
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert!(!is_valid_isbn(""));
        assert!(!is_valid_isbn("12345"));
        assert!(!is_valid_isbn("97803064061X7"));
    }

    #[test]
    fn rejects_non_ascii_digits() {
        // Arabic-Indic and fullwidth renderings of 0306406152
        assert!(!is_valid_isbn("٠٣٠٦٤٠٦١٥٢"));
        assert!(!is_valid_isbn("０３０６４０６１５２"));
    }
}
