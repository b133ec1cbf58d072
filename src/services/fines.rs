//! Fines: assessment, payment and waivers

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    mediator::{DomainEvent, Mediator},
    models::fine::{Fine, FineQuery, FineReason, FineStatus},
    repository::Repository,
};

#[derive(Clone)]
pub struct FinesService {
    repository: Repository,
    mediator: Arc<Mediator>,
}

impl FinesService {
    pub fn new(repository: Repository, mediator: Arc<Mediator>) -> Self {
        Self { repository, mediator }
    }

    /// Insert a fine inside the caller's transaction.
    ///
    /// Returns `None` for a zero amount, or when the loan already carries an
    /// overdue fine.
    pub async fn assess(
        &self,
        conn: &mut PgConnection,
        loan_id: i32,
        user_id: i32,
        amount: Decimal,
        reason: FineReason,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Fine>> {
        if amount <= Decimal::ZERO {
            return Ok(None);
        }
        let fine = self
            .repository
            .fines
            .create(conn, loan_id, user_id, amount, reason, at)
            .await?;
        if let Some(ref fine) = fine {
            tracing::info!(fine_id = fine.id, loan_id, %amount, reason = %reason, "Fine assessed");
        }
        Ok(fine)
    }

    pub async fn get(&self, id: i32) -> AppResult<Fine> {
        self.repository.fines.get_by_id(id).await
    }

    pub async fn list(&self, query: &FineQuery) -> AppResult<(Vec<Fine>, i64)> {
        self.repository.fines.search(query).await
    }

    pub async fn list_for_user(&self, user_id: i32, status: Option<FineStatus>) -> AppResult<Vec<Fine>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.fines.list_for_user(user_id, status).await
    }

    pub async fn outstanding_total(&self, user_id: i32) -> AppResult<Decimal> {
        let mut conn = self.repository.pool.acquire().await?;
        self.repository.fines.outstanding_total(&mut conn, user_id).await
    }

    /// Record a payment made at the desk
    #[tracing::instrument(skip(self))]
    pub async fn pay(&self, id: i32, amount: Option<Decimal>) -> AppResult<Fine> {
        let mut tx = self.repository.begin().await?;
        let fine = self.repository.fines.lock(&mut tx, id).await?;

        let now = Utc::now();
        let (amount_paid, status) = apply_payment(&fine, amount)?;
        let settled_at = (status == FineStatus::Paid).then_some(now);

        let updated = self
            .repository
            .fines
            .record_payment(&mut tx, id, amount_paid, status, settled_at)
            .await?;
        tx.commit().await?;

        tracing::info!(fine_id = id, paid = %amount_paid, status = %status, "Fine payment recorded");
        Ok(updated)
    }

    #[tracing::instrument(skip(self, reason))]
    pub async fn waive(&self, id: i32, waived_by: i32, reason: &str) -> AppResult<Fine> {
        let mut tx = self.repository.begin().await?;
        let fine = self.repository.fines.lock(&mut tx, id).await?;
        if fine.status != FineStatus::Unpaid {
            return Err(AppError::BusinessRule(format!(
                "Only unpaid fines can be waived (fine is {})",
                fine.status
            )));
        }

        let updated = self
            .repository
            .fines
            .waive(&mut tx, id, waived_by, reason.trim(), Utc::now())
            .await?;
        tx.commit().await?;

        tracing::info!(fine_id = id, waived_by, "Fine waived");
        Ok(updated)
    }

    /// Staff charge for a copy returned damaged
    #[tracing::instrument(skip(self))]
    pub async fn assess_damage(&self, loan_id: i32, amount: Decimal) -> AppResult<Fine> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("Amount must be positive".to_string()));
        }
        let loan = self.repository.loans.get_by_id(loan_id).await?;

        let mut tx = self.repository.begin().await?;
        let fine = self
            .assess(&mut tx, loan.id, loan.user_id, amount, FineReason::Damaged, Utc::now())
            .await?
            .ok_or_else(|| AppError::Internal("Damage fine was not recorded".to_string()))?;
        tx.commit().await?;

        self.mediator
            .publish(DomainEvent::FineAssessed {
                fine_id: fine.id,
                loan_id: fine.loan_id,
                user_id: fine.user_id,
                amount: fine.amount,
                reason: fine.reason,
            })
            .await;
        Ok(fine)
    }
}

/// New paid total and status after paying `amount`, defaulting to the full balance
fn apply_payment(fine: &Fine, amount: Option<Decimal>) -> AppResult<(Decimal, FineStatus)> {
    if fine.status != FineStatus::Unpaid {
        return Err(AppError::BusinessRule(format!(
            "Only unpaid fines can be paid (fine is {})",
            fine.status
        )));
    }
    let balance = fine.balance();
    let amount = amount.unwrap_or(balance);
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("Payment amount must be positive".to_string()));
    }
    if amount > balance {
        return Err(AppError::BusinessRule(format!(
            "Payment of {} exceeds the remaining balance of {}",
            amount, balance
        )));
    }

    let paid = fine.amount_paid + amount;
    let status = if paid >= fine.amount {
        FineStatus::Paid
    } else {
        FineStatus::Unpaid
    };
    Ok((paid, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fine(amount: i64, paid: i64, status: FineStatus) -> Fine {
        Fine {
            id: 1,
            loan_id: 1,
            user_id: 1,
            amount: Decimal::new(amount, 2),
            amount_paid: Decimal::new(paid, 2),
            reason: FineReason::Overdue,
            status,
            assessed_at: Utc::now(),
            settled_at: None,
            waived_by: None,
            waive_reason: None,
        }
    }

    #[test]
    fn full_payment_by_default() {
        let (paid, status) = apply_payment(&fine(350, 100, FineStatus::Unpaid), None).unwrap();
        assert_eq!(paid, Decimal::new(350, 2));
        assert_eq!(status, FineStatus::Paid);
    }

    #[test]
    fn partial_payment_keeps_fine_open() {
        let (paid, status) =
            apply_payment(&fine(350, 0, FineStatus::Unpaid), Some(Decimal::new(100, 2))).unwrap();
        assert_eq!(paid, Decimal::new(100, 2));
        assert_eq!(status, FineStatus::Unpaid);
    }

    #[test]
    fn overpayment_is_refused() {
        let result = apply_payment(&fine(350, 300, FineStatus::Unpaid), Some(Decimal::new(100, 2)));
        assert!(matches!(result, Err(AppError::BusinessRule(_))));
    }

    #[test]
    fn non_positive_amount_is_refused() {
        let result = apply_payment(&fine(350, 0, FineStatus::Unpaid), Some(Decimal::ZERO));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn settled_fines_cannot_be_paid() {
        assert!(apply_payment(&fine(350, 350, FineStatus::Paid), None).is_err());
        assert!(apply_payment(&fine(350, 0, FineStatus::Waived), None).is_err());
    }
}
