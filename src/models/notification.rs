//! Member notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

text_enum! {
    NotificationKind {
        DueSoon => "due_soon",
        Overdue => "overdue",
        ReservationReady => "reservation_ready",
        ReservationExpired => "reservation_expired",
        FineAssessed => "fine_assessed",
        LoanRenewed => "loan_renewed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
    pub loan_id: Option<i32>,
    pub reservation_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub emailed_at: Option<DateTime<Utc>>,
}

/// A notification to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: i32,
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
    pub loan_id: Option<i32>,
    pub reservation_id: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCount {
    pub unread: i64,
}
