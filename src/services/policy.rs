//! Circulation rules: due dates, renewal eligibility, fine amounts

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::loan::{Loan, LoanStatus},
};

#[derive(Debug, Clone)]
pub struct CirculationPolicy {
    config: CirculationConfig,
}

impl CirculationPolicy {
    pub fn new(config: CirculationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CirculationConfig {
        &self.config
    }

    pub fn due_date(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + Duration::days(self.config.loan_days)
    }

    pub fn hold_until(&self, ready_at: DateTime<Utc>) -> DateTime<Utc> {
        ready_at + Duration::days(self.config.reservation_hold_days)
    }

    /// Whole days late, counting any started day
    pub fn days_late(due_at: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
        if at <= due_at {
            return 0;
        }
        let late = at - due_at;
        let days = late.num_days();
        if late > Duration::days(days) {
            days + 1
        } else {
            days
        }
    }

    /// Overdue fine for a copy returned at `at`, capped per loan
    pub fn overdue_fine(&self, due_at: DateTime<Utc>, at: DateTime<Utc>) -> Decimal {
        let days = Self::days_late(due_at, at);
        let fine = self.config.daily_fine * Decimal::from(days);
        fine.min(self.config.max_fine_per_loan)
    }

    pub fn lost_fee(&self, replacement_cost: Option<Decimal>) -> Decimal {
        replacement_cost
            .filter(|c| *c > Decimal::ZERO)
            .unwrap_or(self.config.lost_item_fee)
    }

    pub fn is_due_soon(&self, due_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        due_at >= now && due_at <= now + Duration::days(self.config.due_soon_days)
    }

    /// Checks a member's standing before a checkout
    pub fn check_borrower(&self, active_loans: i64, outstanding_fines: Decimal) -> AppResult<()> {
        if active_loans >= self.config.max_active_loans {
            return Err(AppError::BusinessRule(format!(
                "Maximum loans reached ({}/{})",
                active_loans, self.config.max_active_loans
            )));
        }
        if outstanding_fines >= self.config.fine_block_threshold {
            return Err(AppError::BusinessRule(format!(
                "Unpaid fines of {} exceed the borrowing limit of {}",
                outstanding_fines, self.config.fine_block_threshold
            )));
        }
        Ok(())
    }

    /// Checks whether a loan may be renewed now
    pub fn check_renewal(&self, loan: &Loan, now: DateTime<Utc>, others_waiting: bool) -> AppResult<()> {
        if loan.status != LoanStatus::Active {
            return Err(AppError::BusinessRule("Cannot renew a returned loan".to_string()));
        }
        if loan.due_at < now {
            return Err(AppError::BusinessRule("Cannot renew an overdue loan".to_string()));
        }
        if loan.renewals >= self.config.max_renewals {
            return Err(AppError::BusinessRule(format!(
                "Maximum renewals reached ({}/{})",
                loan.renewals, self.config.max_renewals
            )));
        }
        if others_waiting {
            return Err(AppError::BusinessRule(
                "Another member is waiting for this book".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> CirculationPolicy {
        CirculationPolicy::new(CirculationConfig::default())
    }

    fn loan(due_at: DateTime<Utc>, renewals: i32, status: LoanStatus) -> Loan {
        Loan {
            id: 1,
            copy_id: 1,
            user_id: 1,
            loaned_at: due_at - Duration::days(21),
            due_at,
            returned_at: None,
            renewals,
            status,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn due_date_adds_loan_period() {
        assert_eq!(policy().due_date(at(1, 12)), at(22, 12));
    }

    #[test]
    fn days_late_counts_started_days() {
        assert_eq!(CirculationPolicy::days_late(at(10, 12), at(10, 11)), 0);
        assert_eq!(CirculationPolicy::days_late(at(10, 12), at(10, 12)), 0);
        assert_eq!(CirculationPolicy::days_late(at(10, 12), at(10, 13)), 1);
        assert_eq!(CirculationPolicy::days_late(at(10, 12), at(12, 12)), 2);
        assert_eq!(CirculationPolicy::days_late(at(10, 12), at(12, 13)), 3);
    }

    #[test]
    fn overdue_fine_is_capped() {
        let p = policy();
        assert_eq!(p.overdue_fine(at(10, 12), at(9, 12)), Decimal::ZERO);
        assert_eq!(p.overdue_fine(at(10, 12), at(14, 12)), Decimal::new(100, 2));
        // 60 days * 0.25 = 15.00, capped at 10.00
        let due = at(1, 0);
        assert_eq!(p.overdue_fine(due, due + Duration::days(60)), Decimal::new(1000, 2));
    }

    #[test]
    fn lost_fee_prefers_replacement_cost() {
        let p = policy();
        assert_eq!(p.lost_fee(Some(Decimal::new(3999, 2))), Decimal::new(3999, 2));
        assert_eq!(p.lost_fee(None), Decimal::new(2500, 2));
        assert_eq!(p.lost_fee(Some(Decimal::ZERO)), Decimal::new(2500, 2));
    }

    #[test]
    fn borrower_limits() {
        let p = policy();
        assert!(p.check_borrower(4, Decimal::new(499, 2)).is_ok());
        assert!(p.check_borrower(5, Decimal::ZERO).is_err());
        assert!(p.check_borrower(0, Decimal::new(500, 2)).is_err());
    }

    #[test]
    fn renewal_rules() {
        let p = policy();
        let now = at(5, 12);
        assert!(p.check_renewal(&loan(at(10, 12), 0, LoanStatus::Active), now, false).is_ok());
        assert!(p.check_renewal(&loan(at(10, 12), 2, LoanStatus::Active), now, false).is_err());
        assert!(p.check_renewal(&loan(at(4, 12), 0, LoanStatus::Active), now, false).is_err());
        assert!(p.check_renewal(&loan(at(10, 12), 0, LoanStatus::Returned), now, false).is_err());
        assert!(p.check_renewal(&loan(at(10, 12), 0, LoanStatus::Active), now, true).is_err());
    }

    #[test]
    fn due_soon_window() {
        let p = policy();
        let now = at(10, 12);
        assert!(p.is_due_soon(at(11, 12), now));
        assert!(p.is_due_soon(at(12, 12), now));
        assert!(!p.is_due_soon(at(13, 12), now));
        assert!(!p.is_due_soon(at(9, 12), now));
    }
}
