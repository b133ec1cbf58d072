//! Member notifications: storage, email delivery and due-date reminders

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    error::AppResult,
    mediator::{DomainEvent, EventHandler},
    models::{
        loan::LoanDetails,
        notification::{NewNotification, Notification, NotificationKind, NotificationQuery},
    },
    repository::Repository,
    services::{email::EmailService, policy::CirculationPolicy},
};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct NotificationsService {
    repository: Repository,
    email: EmailService,
    policy: CirculationPolicy,
}

impl NotificationsService {
    pub fn new(repository: Repository, email: EmailService, policy: CirculationPolicy) -> Self {
        Self {
            repository,
            email,
            policy,
        }
    }

    /// Store a notification, then email it when mail is enabled and the member has an address
    #[tracing::instrument(skip(self, notification), fields(user_id = notification.user_id, kind = %notification.kind))]
    pub async fn notify(&self, notification: NewNotification) -> AppResult<Notification> {
        let mut stored = self.repository.notifications.create(&notification).await?;

        if !self.email.is_enabled() {
            return Ok(stored);
        }

        let user = self.repository.users.get_by_id(notification.user_id).await?;
        let Some(address) = user.email.as_deref().filter(|a| !a.trim().is_empty()) else {
            return Ok(stored);
        };

        match self.email.send(address, &stored.subject, &stored.body).await {
            Ok(()) => {
                self.repository.notifications.mark_emailed(stored.id).await?;
                stored.emailed_at = Some(Utc::now());
            }
            Err(e) => {
                tracing::warn!(notification_id = stored.id, "Failed to email notification: {}", e);
            }
        }
        Ok(stored)
    }

    pub async fn list(&self, user_id: i32, query: &NotificationQuery) -> AppResult<(Vec<Notification>, i64)> {
        self.repository
            .notifications
            .list_for_user(user_id, query.unread_only, query.page, query.per_page)
            .await
    }

    pub async fn unread_count(&self, user_id: i32) -> AppResult<i64> {
        self.repository.notifications.unread_count(user_id).await
    }

    pub async fn mark_read(&self, id: i32, user_id: i32) -> AppResult<Notification> {
        self.repository.notifications.mark_read(id, user_id).await
    }

    pub async fn mark_all_read(&self, user_id: i32) -> AppResult<u64> {
        self.repository.notifications.mark_all_read(user_id).await
    }

    /// Send due-soon and overdue reminders. Each loan gets at most one of each kind.
    #[tracing::instrument(skip(self))]
    pub async fn send_due_reminders(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let horizon = now + Duration::days(self.policy.config().due_soon_days);
        let loans = self.repository.loans.active_due_before(horizon).await?;
        let mut sent = 0;

        for loan in &loans {
            let Some(reminder) = reminder_for(loan, now, &self.policy) else {
                continue;
            };
            match self.repository.notifications.exists_for_loan(loan.id, reminder.kind).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(loan_id = loan.id, "Failed to check reminders: {}", e);
                    continue;
                }
            }
            match self.notify(reminder).await {
                Ok(_) => sent += 1,
                Err(e) => tracing::warn!(loan_id = loan.id, "Failed to send reminder: {}", e),
            }
        }
        Ok(sent)
    }
}

/// Reminder owed for an active loan at `now`, if any
fn reminder_for(loan: &LoanDetails, now: DateTime<Utc>, policy: &CirculationPolicy) -> Option<NewNotification> {
    let (kind, subject, body) = if loan.due_at < now {
        (
            NotificationKind::Overdue,
            "Your loan is overdue".to_string(),
            format!(
                "\"{}\" (copy {}) was due on {}. Please return it as soon as possible; fines accrue daily.",
                loan.title,
                loan.barcode,
                loan.due_at.format(DATE_FORMAT)
            ),
        )
    } else if policy.is_due_soon(loan.due_at, now) {
        (
            NotificationKind::DueSoon,
            "Your loan is due soon".to_string(),
            format!(
                "\"{}\" (copy {}) is due on {}.",
                loan.title,
                loan.barcode,
                loan.due_at.format(DATE_FORMAT)
            ),
        )
    } else {
        return None;
    };

    Some(NewNotification {
        user_id: loan.user_id,
        kind,
        subject,
        body,
        loan_id: Some(loan.id),
        reservation_id: None,
    })
}

/// Notification a member should receive for a domain event, if any
fn notification_for_event(event: &DomainEvent) -> Option<NewNotification> {
    let notification = match event {
        DomainEvent::LoanRenewed {
            loan_id,
            user_id,
            title,
            due_at,
        } => NewNotification {
            user_id: *user_id,
            kind: NotificationKind::LoanRenewed,
            subject: "Loan renewed".to_string(),
            body: format!("\"{}\" is now due on {}.", title, due_at.format(DATE_FORMAT)),
            loan_id: Some(*loan_id),
            reservation_id: None,
        },
        DomainEvent::ReservationReady {
            reservation_id,
            user_id,
            title,
            hold_until,
        } => NewNotification {
            user_id: *user_id,
            kind: NotificationKind::ReservationReady,
            subject: "Your reservation is ready".to_string(),
            body: format!(
                "\"{}\" is waiting for you at the desk until {}.",
                title,
                hold_until.format(DATE_FORMAT)
            ),
            loan_id: None,
            reservation_id: Some(*reservation_id),
        },
        DomainEvent::ReservationExpired {
            reservation_id,
            user_id,
            title,
        } => NewNotification {
            user_id: *user_id,
            kind: NotificationKind::ReservationExpired,
            subject: "Your reservation has expired".to_string(),
            body: format!("The hold on \"{}\" has lapsed and the copy was released.", title),
            loan_id: None,
            reservation_id: Some(*reservation_id),
        },
        DomainEvent::FineAssessed {
            loan_id,
            user_id,
            amount,
            reason,
            ..
        } => NewNotification {
            user_id: *user_id,
            kind: NotificationKind::FineAssessed,
            subject: "A fine was added to your account".to_string(),
            body: format!("A fine of {} was assessed ({}).", amount, reason),
            loan_id: Some(*loan_id),
            reservation_id: None,
        },
        DomainEvent::LoanCreated { .. } | DomainEvent::LoanReturned { .. } | DomainEvent::LoanLost { .. } => {
            return None
        }
    };
    Some(notification)
}

/// Turns domain events into member notifications
pub struct NotificationHandler {
    notifications: NotificationsService,
}

impl NotificationHandler {
    pub fn new(notifications: NotificationsService) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    async fn handle(&self, event: &DomainEvent) -> AppResult<()> {
        if let Some(notification) = notification_for_event(event) {
            self.notifications.notify(notification).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CirculationConfig,
        models::{fine::FineReason, loan::LoanStatus},
    };
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn loan(due_at: DateTime<Utc>) -> LoanDetails {
        LoanDetails {
            id: 11,
            copy_id: 2,
            barcode: "B-0002".to_string(),
            book_id: 5,
            title: "The Left Hand of Darkness".to_string(),
            user_id: 42,
            borrower: "Genly Ai".to_string(),
            loaned_at: due_at - Duration::days(21),
            due_at,
            returned_at: None,
            renewals: 0,
            status: LoanStatus::Active,
            is_overdue: false,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn overdue_loans_get_overdue_reminders() {
        let policy = CirculationPolicy::new(CirculationConfig::default());
        let reminder = reminder_for(&loan(now() - Duration::hours(1)), now(), &policy).unwrap();
        assert_eq!(reminder.kind, NotificationKind::Overdue);
        assert_eq!(reminder.user_id, 42);
        assert_eq!(reminder.loan_id, Some(11));
        assert!(reminder.body.contains("2026-03-10"));
    }

    #[test]
    fn loans_due_within_window_get_due_soon() {
        let policy = CirculationPolicy::new(CirculationConfig::default());
        let reminder = reminder_for(&loan(now() + Duration::days(1)), now(), &policy).unwrap();
        assert_eq!(reminder.kind, NotificationKind::DueSoon);
        assert!(reminder_for(&loan(now() + Duration::days(5)), now(), &policy).is_none());
    }

    #[test]
    fn fine_events_become_notifications() {
        let event = DomainEvent::FineAssessed {
            fine_id: 1,
            loan_id: 11,
            user_id: 42,
            amount: Decimal::new(175, 2),
            reason: FineReason::Overdue,
        };
        let n = notification_for_event(&event).unwrap();
        assert_eq!(n.kind, NotificationKind::FineAssessed);
        assert_eq!(n.body, "A fine of 1.75 was assessed (overdue).");
    }

    #[test]
    fn ready_reservations_mention_the_hold_date() {
        let event = DomainEvent::ReservationReady {
            reservation_id: 8,
            user_id: 42,
            title: "Dune".to_string(),
            hold_until: now() + Duration::days(3),
        };
        let n = notification_for_event(&event).unwrap();
        assert_eq!(n.reservation_id, Some(8));
        assert!(n.body.contains("2026-03-13"));
    }

    #[test]
    fn circulation_events_without_member_message_are_skipped() {
        let event = DomainEvent::LoanReturned {
            loan_id: 1,
            user_id: 42,
            title: "Dune".to_string(),
            returned_at: now(),
        };
        assert!(notification_for_event(&event).is_none());
    }
}
