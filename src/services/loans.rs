//! Circulation: checkout, return, renewal and lost copies

use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    mediator::{DomainEvent, Mediator},
    models::{
        copy::CopyStatus,
        fine::{Fine, FineReason},
        loan::{CreateLoan, LoanDetails, LoanQuery, LoanStatus},
        reservation::ReservationStatus,
        user::UserStatus,
    },
    repository::Repository,
    services::{fines::FinesService, policy::CirculationPolicy, reservations::ReservationsService},
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    policy: CirculationPolicy,
    reservations: ReservationsService,
    fines: FinesService,
    mediator: Arc<Mediator>,
}

fn fine_event(fine: &Fine) -> DomainEvent {
    DomainEvent::FineAssessed {
        fine_id: fine.id,
        loan_id: fine.loan_id,
        user_id: fine.user_id,
        amount: fine.amount,
        reason: fine.reason,
    }
}

impl LoansService {
    pub fn new(
        repository: Repository,
        policy: CirculationPolicy,
        reservations: ReservationsService,
        fines: FinesService,
        mediator: Arc<Mediator>,
    ) -> Self {
        Self {
            repository,
            policy,
            reservations,
            fines,
            mediator,
        }
    }

    pub async fn get(&self, id: i32) -> AppResult<LoanDetails> {
        self.repository.loans.get_details(id).await
    }

    pub async fn search(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        self.repository.loans.search(query).await
    }

    pub async fn list_for_user(&self, user_id: i32, include_returned: bool) -> AppResult<Vec<LoanDetails>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.loans.list_for_user(user_id, include_returned).await
    }

    /// Lend a copy to a member
    #[tracing::instrument(skip(self, request), fields(user_id = request.user_id))]
    pub async fn checkout(&self, request: &CreateLoan) -> AppResult<LoanDetails> {
        let now = Utc::now();

        let user = self.repository.users.get_by_id(request.user_id).await?;
        if user.status != UserStatus::Active {
            return Err(AppError::BusinessRule(format!("User account is {}", user.status)));
        }

        let copy_id = match (request.copy_id, request.barcode.as_deref()) {
            (Some(id), _) => id,
            (None, Some(barcode)) => self.repository.copies.get_by_barcode(barcode.trim()).await?.id,
            (None, None) => {
                return Err(AppError::BadRequest(
                    "Either copy_id or barcode is required".to_string(),
                ))
            }
        };

        let mut tx = self.repository.begin().await?;
        let copy = self.repository.copies.lock(&mut tx, copy_id).await?;

        if request.force {
            tracing::warn!(user_id = user.id, copy_id, "Checkout forced past borrower limits");
        } else {
            let active = self.repository.loans.count_active_for_user(&mut tx, user.id).await?;
            let outstanding = self.repository.fines.outstanding_total(&mut tx, user.id).await?;
            if let Err(e) = self.policy.check_borrower(active, outstanding) {
                tracing::warn!(user_id = user.id, "Checkout refused: {}", e);
                return Err(e);
            }
        }

        let mut handed_on = None;
        match copy.status {
            CopyStatus::Available => {
                let held = self
                    .repository
                    .reservations
                    .ready_held_by_others(&mut tx, copy.book_id, user.id)
                    .await?;
                if held > 0 {
                    return Err(AppError::BusinessRule(
                        "Copies of this book are on hold for other members".to_string(),
                    ));
                }
                // Borrowing directly satisfies the member's own place in the queue
                if let Some(own) = self
                    .repository
                    .reservations
                    .open_for_user_book(user.id, copy.book_id)
                    .await?
                {
                    let own = self.repository.reservations.lock(&mut tx, own.id).await?;
                    if own.status.is_open() {
                        self.repository
                            .reservations
                            .close(&mut tx, own.id, ReservationStatus::Fulfilled, now)
                            .await?;
                        // The copy held for them goes to the next member in line
                        handed_on = self.reservations.release_held_copy(&mut tx, &own, now).await?;
                    }
                }
            }
            CopyStatus::Reserved => {
                let hold = self.repository.reservations.ready_for_copy(&mut tx, copy.id).await?;
                match hold {
                    Some(hold) if hold.user_id == user.id => {
                        self.repository
                            .reservations
                            .close(&mut tx, hold.id, ReservationStatus::Fulfilled, now)
                            .await?;
                    }
                    _ => {
                        return Err(AppError::BusinessRule(format!(
                            "Copy {} is on hold for another member",
                            copy.barcode
                        )))
                    }
                }
            }
            status => {
                return Err(AppError::BusinessRule(format!(
                    "Copy {} is {} and cannot be borrowed",
                    copy.barcode, status
                )))
            }
        }

        let due_at = self.policy.due_date(now);
        let loan = self
            .repository
            .loans
            .create(&mut tx, copy.id, user.id, now, due_at)
            .await
            .map_err(|e| e.on_unique_violation(format!("Copy {} is already on loan", copy.barcode)))?;
        self.repository
            .copies
            .set_status(&mut tx, copy.id, CopyStatus::Borrowed)
            .await?;
        tx.commit().await?;

        tracing::info!(loan_id = loan.id, copy_id = copy.id, user_id = user.id, %due_at, "Copy checked out");

        let details = self.repository.loans.get_details(loan.id).await?;
        self.mediator
            .publish(DomainEvent::LoanCreated {
                loan_id: loan.id,
                user_id: user.id,
                title: details.title.clone(),
                due_at,
            })
            .await;
        if let Some(ready) = handed_on {
            self.reservations.publish_ready(&ready).await;
        }
        Ok(details)
    }

    /// Close an active loan and route the copy
    #[tracing::instrument(skip(self))]
    pub async fn return_loan(&self, id: i32, damaged: bool) -> AppResult<LoanDetails> {
        let now = Utc::now();
        let mut tx = self.repository.begin().await?;

        let loan = self.repository.loans.lock(&mut tx, id).await?;
        if loan.status != LoanStatus::Active {
            return Err(AppError::BusinessRule("Loan already returned".to_string()));
        }

        self.repository
            .loans
            .close(&mut tx, id, LoanStatus::Returned, now)
            .await?;

        let overdue = self.policy.overdue_fine(loan.due_at, now);
        let fine = self
            .fines
            .assess(&mut tx, loan.id, loan.user_id, overdue, FineReason::Overdue, now)
            .await?;

        let copy = self.repository.copies.lock(&mut tx, loan.copy_id).await?;
        let ready = if damaged {
            self.repository
                .copies
                .set_status(&mut tx, copy.id, CopyStatus::Damaged)
                .await?;
            None
        } else {
            self.reservations
                .hand_off_copy(&mut tx, copy.id, copy.book_id, now)
                .await?
        };
        tx.commit().await?;

        tracing::info!(loan_id = id, copy_id = copy.id, damaged, "Copy returned");

        let details = self.repository.loans.get_details(id).await?;
        let mut events = vec![DomainEvent::LoanReturned {
            loan_id: id,
            user_id: loan.user_id,
            title: details.title.clone(),
            returned_at: now,
        }];
        events.extend(fine.as_ref().map(fine_event));
        self.mediator.publish_all(events).await;
        if let Some(ready) = ready {
            self.reservations.publish_ready(&ready).await;
        }
        Ok(details)
    }

    pub async fn return_by_barcode(&self, barcode: &str, damaged: bool) -> AppResult<LoanDetails> {
        let copy = self.repository.copies.get_by_barcode(barcode.trim()).await?;
        let loan = self
            .repository
            .loans
            .active_for_copy(copy.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No active loan for copy {}", copy.barcode)))?;
        self.return_loan(loan.id, damaged).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn renew(&self, id: i32) -> AppResult<LoanDetails> {
        let now = Utc::now();
        let mut tx = self.repository.begin().await?;

        let loan = self.repository.loans.lock(&mut tx, id).await?;
        let copy = self.repository.copies.get_by_id(loan.copy_id).await?;
        let others_waiting = self
            .repository
            .reservations
            .others_pending(&mut tx, copy.book_id, loan.user_id)
            .await?;

        if let Err(e) = self.policy.check_renewal(&loan, now, others_waiting) {
            tracing::warn!(loan_id = id, "Renewal refused: {}", e);
            return Err(e);
        }

        let due_at = self.policy.due_date(now);
        let renewed = self.repository.loans.renew(&mut tx, id, due_at).await?;
        tx.commit().await?;

        tracing::info!(loan_id = id, renewals = renewed.renewals, %due_at, "Loan renewed");

        let details = self.repository.loans.get_details(id).await?;
        self.mediator
            .publish(DomainEvent::LoanRenewed {
                loan_id: id,
                user_id: loan.user_id,
                title: details.title.clone(),
                due_at,
            })
            .await;
        Ok(details)
    }

    /// Close the loan as lost and charge the replacement fee plus any overdue fine
    #[tracing::instrument(skip(self))]
    pub async fn mark_lost(&self, id: i32) -> AppResult<LoanDetails> {
        let now = Utc::now();
        let mut tx = self.repository.begin().await?;

        let loan = self.repository.loans.lock(&mut tx, id).await?;
        if loan.status != LoanStatus::Active {
            return Err(AppError::BusinessRule("Loan already returned".to_string()));
        }

        let copy = self.repository.copies.lock(&mut tx, loan.copy_id).await?;
        let book = self.repository.books.get_by_id(copy.book_id).await?;

        self.repository
            .loans
            .close(&mut tx, id, LoanStatus::Lost, now)
            .await?;
        self.repository
            .copies
            .set_status(&mut tx, copy.id, CopyStatus::Lost)
            .await?;

        let mut fines = Vec::new();
        let overdue = self.policy.overdue_fine(loan.due_at, now);
        fines.extend(
            self.fines
                .assess(&mut tx, loan.id, loan.user_id, overdue, FineReason::Overdue, now)
                .await?,
        );
        let fee = self.policy.lost_fee(book.replacement_cost);
        fines.extend(
            self.fines
                .assess(&mut tx, loan.id, loan.user_id, fee, FineReason::Lost, now)
                .await?,
        );
        tx.commit().await?;

        tracing::info!(loan_id = id, copy_id = copy.id, %fee, "Loan marked lost");

        let mut events = vec![DomainEvent::LoanLost {
            loan_id: id,
            user_id: loan.user_id,
            title: book.title.clone(),
        }];
        events.extend(fines.iter().map(fine_event));
        self.mediator.publish_all(events).await;

        self.repository.loans.get_details(id).await
    }
}
