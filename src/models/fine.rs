//! Fine model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

text_enum! {
    FineReason {
        Overdue => "overdue",
        Lost => "lost",
        Damaged => "damaged",
    }
}

text_enum! {
    FineStatus {
        Unpaid => "unpaid",
        Paid => "paid",
        Waived => "waived",
    }
}

/// Fine model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Fine {
    pub id: i32,
    pub loan_id: i32,
    pub user_id: i32,
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub reason: FineReason,
    pub status: FineStatus,
    pub assessed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub waived_by: Option<i32>,
    pub waive_reason: Option<String>,
}

impl Fine {
    pub fn balance(&self) -> Decimal {
        self.amount - self.amount_paid
    }
}

/// Fine list filters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct FineQuery {
    pub status: Option<FineStatus>,
    pub user_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Payment request
#[derive(Debug, Deserialize, ToSchema)]
pub struct PayFine {
    /// Defaults to the outstanding balance
    pub amount: Option<Decimal>,
}

/// Waive request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WaiveFine {
    #[validate(length(min = 3, message = "A reason is required"))]
    pub reason: String,
}

/// Damage fine request
#[derive(Debug, Deserialize, ToSchema)]
pub struct AssessDamage {
    pub amount: Decimal,
}

/// Outstanding balance summary
#[derive(Debug, Serialize, ToSchema)]
pub struct FineBalance {
    pub user_id: i32,
    pub outstanding: Decimal,
}
