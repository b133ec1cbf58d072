//! In-process domain event dispatch
//!
//! Services publish a [`DomainEvent`] once their transaction has committed.
//! The [`Mediator`] hands it to every registered [`EventHandler`] in
//! registration order. Handler failures are logged and never reach the
//! publisher.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{error::AppResult, models::fine::FineReason};

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    LoanCreated {
        loan_id: i32,
        user_id: i32,
        title: String,
        due_at: DateTime<Utc>,
    },
    LoanReturned {
        loan_id: i32,
        user_id: i32,
        title: String,
        returned_at: DateTime<Utc>,
    },
    LoanRenewed {
        loan_id: i32,
        user_id: i32,
        title: String,
        due_at: DateTime<Utc>,
    },
    LoanLost {
        loan_id: i32,
        user_id: i32,
        title: String,
    },
    ReservationReady {
        reservation_id: i32,
        user_id: i32,
        title: String,
        hold_until: DateTime<Utc>,
    },
    ReservationExpired {
        reservation_id: i32,
        user_id: i32,
        title: String,
    },
    FineAssessed {
        fine_id: i32,
        loan_id: i32,
        user_id: i32,
        amount: Decimal,
        reason: FineReason,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::LoanCreated { .. } => "loan_created",
            DomainEvent::LoanReturned { .. } => "loan_returned",
            DomainEvent::LoanRenewed { .. } => "loan_renewed",
            DomainEvent::LoanLost { .. } => "loan_lost",
            DomainEvent::ReservationReady { .. } => "reservation_ready",
            DomainEvent::ReservationExpired { .. } => "reservation_expired",
            DomainEvent::FineAssessed { .. } => "fine_assessed",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> AppResult<()>;
}

#[derive(Clone, Default)]
pub struct Mediator {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub async fn publish(&self, event: DomainEvent) {
        tracing::debug!(event = event.name(), handlers = self.handlers.len(), "Publishing domain event");
        for handler in &self.handlers {
            if let Err(e) = handler.handle(&event).await {
                tracing::warn!(event = event.name(), "Event handler failed: {}", e);
            }
        }
    }

    /// Publish events in order
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use mockall::Sequence;

    fn lost_event() -> DomainEvent {
        DomainEvent::LoanLost {
            loan_id: 3,
            user_id: 9,
            title: "Dune".to_string(),
        }
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let mut seq = Sequence::new();
        let mut first = MockEventHandler::new();
        first
            .expect_handle()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let mut second = MockEventHandler::new();
        second
            .expect_handle()
            .withf(|e| matches!(e, DomainEvent::LoanLost { loan_id: 3, .. }))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut mediator = Mediator::new();
        mediator.register(Arc::new(first));
        mediator.register(Arc::new(second));
        mediator.publish(lost_event()).await;
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_the_others() {
        let mut failing = MockEventHandler::new();
        failing
            .expect_handle()
            .times(1)
            .returning(|_| Err(AppError::Internal("smtp down".to_string())));
        let mut after = MockEventHandler::new();
        after.expect_handle().times(1).returning(|_| Ok(()));

        let mut mediator = Mediator::new();
        mediator.register(Arc::new(failing));
        mediator.register(Arc::new(after));
        mediator.publish(lost_event()).await;
    }

    #[tokio::test]
    async fn publishing_without_handlers_is_a_no_op() {
        Mediator::new().publish_all(vec![lost_event(), lost_event()]).await;
    }
}
