//! Physical copy model and its status transition table

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

text_enum! {
    /// State of a physical copy
    CopyStatus {
        Available => "available",
        Borrowed => "borrowed",
        Reserved => "reserved",
        Damaged => "damaged",
        Lost => "lost",
    }
}

impl CopyStatus {
    /// Whether a copy may move from `self` to `to`
    pub fn can_transition_to(self, to: CopyStatus) -> bool {
        use CopyStatus::*;

        match (self, to) {
            (a, b) if a == b => false,
            (Available, _) => true,
            (Borrowed, Available | Damaged | Lost) => true,
            (Reserved, Available | Borrowed | Damaged | Lost) => true,
            (Damaged, Available | Lost) => true,
            (Lost, Available | Damaged) => true,
            _ => false,
        }
    }

    /// Statuses owned by circulation; staff cannot set or clear them by hand
    pub fn is_circulation_managed(self) -> bool {
        matches!(self, CopyStatus::Borrowed | CopyStatus::Reserved)
    }
}

/// Physical copy of a book
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookCopy {
    pub id: i32,
    pub book_id: i32,
    pub barcode: String,
    pub location: Option<String>,
    pub status: CopyStatus,
    pub notes: Option<String>,
    pub acquired_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Create copy request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCopy {
    #[validate(length(min = 1, max = 64, message = "Barcode is required"))]
    pub barcode: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub acquired_at: Option<NaiveDate>,
}

/// Update copy request
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCopy {
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Manual status change request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeCopyStatus {
    pub status: CopyStatus,
    /// Recorded in the audit trail
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::CopyStatus::{self, *};

    const ALL: [CopyStatus; 5] = [Available, Borrowed, Reserved, Damaged, Lost];

    #[test]
    fn transition_table() {
        let allowed = [
            (Available, [false, true, true, true, true]),
            (Borrowed, [true, false, false, true, true]),
            (Reserved, [true, true, false, true, true]),
            (Damaged, [true, false, false, false, true]),
            (Lost, [true, false, false, true, false]),
        ];
        for (from, row) in allowed {
            for (to, expected) in ALL.iter().zip(row) {
                assert_eq!(
                    from.can_transition_to(*to),
                    expected,
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn circulation_managed() {
        assert!(Borrowed.is_circulation_managed());
        assert!(Reserved.is_circulation_managed());
        assert!(!Damaged.is_circulation_managed());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("LOST".parse::<CopyStatus>().unwrap(), Lost);
        assert!("missing".parse::<CopyStatus>().is_err());
    }
}
