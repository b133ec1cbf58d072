//! Loan model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

text_enum! {
    /// Loan lifecycle
    LoanStatus {
        Active => "active",
        Returned => "returned",
        Lost => "lost",
    }
}

/// Loan model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub copy_id: i32,
    pub user_id: i32,
    pub loaned_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub renewals: i32,
    pub status: LoanStatus,
}

impl Loan {
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status == LoanStatus::Active && self.due_at < now
    }
}

/// Loan with book, copy and borrower details for display
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub copy_id: i32,
    pub barcode: String,
    pub book_id: i32,
    pub title: String,
    pub user_id: i32,
    pub borrower: String,
    pub loaned_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub renewals: i32,
    pub status: LoanStatus,
    pub is_overdue: bool,
}

/// Checkout request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLoan {
    pub user_id: i32,
    /// Copy ID (optional if barcode provided)
    pub copy_id: Option<i32>,
    pub barcode: Option<String>,
    /// Skip the loan-limit and unpaid-fines checks
    #[serde(default)]
    pub force: bool,
}

/// Return request body
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReturnLoan {
    /// Copy came back damaged
    #[serde(default)]
    pub damaged: bool,
}

/// Loan list filters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    pub status: Option<LoanStatus>,
    pub user_id: Option<i32>,
    #[serde(default)]
    pub overdue_only: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// User loans filter
#[derive(Debug, Deserialize, IntoParams)]
pub struct UserLoansQuery {
    #[serde(default)]
    pub include_returned: bool,
}
