//! Business logic services

pub mod audit;
pub mod catalog;
pub mod email;
pub mod fines;
pub mod loans;
pub mod notifications;
pub mod policy;
pub mod redis;
pub mod reservations;
pub mod users;

use std::sync::Arc;

use crate::{config::AppConfig, error::AppResult, mediator::Mediator, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub reservations: reservations::ReservationsService,
    pub fines: fines::FinesService,
    pub notifications: notifications::NotificationsService,
    pub audit: audit::AuditService,
    pub redis: redis::RedisService,
    repository: Repository,
}

impl Services {
    /// Wire services together; the notification handler is the mediator's only subscriber
    pub fn new(repository: Repository, config: &AppConfig, redis_service: redis::RedisService) -> Self {
        let policy = policy::CirculationPolicy::new(config.circulation.clone());
        let email = email::EmailService::new(config.email.clone());

        let notifications =
            notifications::NotificationsService::new(repository.clone(), email, policy.clone());

        let mut mediator = Mediator::new();
        mediator.register(Arc::new(notifications::NotificationHandler::new(
            notifications.clone(),
        )));
        let mediator = Arc::new(mediator);

        let fines = fines::FinesService::new(repository.clone(), mediator.clone());
        let reservations =
            reservations::ReservationsService::new(repository.clone(), policy.clone(), mediator.clone());
        let loans = loans::LoansService::new(
            repository.clone(),
            policy,
            reservations.clone(),
            fines.clone(),
            mediator,
        );

        Self {
            users: users::UsersService::new(repository.clone(), config.auth.clone(), redis_service.clone()),
            catalog: catalog::CatalogService::new(repository.clone()),
            loans,
            reservations,
            fines,
            notifications,
            audit: audit::AuditService::new(repository.clone()),
            redis: redis_service,
            repository,
        }
    }

    /// Database readiness check
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
