//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{
        CreateUser, Role, UpdateProfile, UpdateUser, User, UserClaims, UserQuery, UserShort,
        UserStatus,
    },
    repository::Repository,
    services::redis::RedisService,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
    redis: RedisService,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig, redis: RedisService) -> Self {
        Self { repository, config, redis }
    }

    /// Authenticate user by login and return a JWT token
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(&self, login: &str, password: &str) -> AppResult<(String, User)> {
        let invalid = || AppError::Authentication("Invalid login or password".to_string());

        let user = self.repository.users.get_by_login(login).await?.ok_or_else(invalid)?;

        match user.status {
            UserStatus::Deleted => return Err(invalid()),
            UserStatus::Blocked => {
                tracing::warn!(user_id = user.id, "Login attempt on blocked account");
                return Err(AppError::Authentication("Account is blocked".to_string()));
            }
            UserStatus::Active => {}
        }

        if !verify_password(user.password.as_deref(), password) {
            return Err(invalid());
        }

        let token = self.create_token_for_user(&user)?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok((token, user))
    }

    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.login.clone(),
            user_id: user.id,
            role: user.role,
            jti: uuid::Uuid::new_v4().to_string(),
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Revoke the token until it would have expired anyway
    pub async fn logout(&self, claims: &UserClaims) -> AppResult<()> {
        let remaining = (claims.exp - Utc::now().timestamp()).max(0) as u64;
        self.redis.revoke_token(&claims.jti, remaining).await?;
        tracing::info!(user_id = claims.user_id, "User logged out");
        Ok(())
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn search(&self, query: &UserQuery) -> AppResult<(Vec<UserShort>, i64)> {
        self.repository.users.search(query).await
    }

    async fn ensure_unique(&self, login: Option<&str>, email: Option<&str>, exclude_id: Option<i32>) -> AppResult<()> {
        if let Some(login) = login {
            if self.repository.users.login_exists(login, exclude_id).await? {
                return Err(AppError::Conflict(format!("Login '{}' is already taken", login)));
            }
        }
        if let Some(email) = email {
            if self.repository.users.email_exists(email, exclude_id).await? {
                return Err(AppError::Conflict(format!("Email '{}' is already in use", email)));
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, user), fields(login = %user.login))]
    pub async fn create_user(&self, user: &CreateUser) -> AppResult<User> {
        self.ensure_unique(Some(&user.login), user.email.as_deref(), None).await?;
        let hash = hash_password(&user.password)?;
        let created = self.repository.users.create(user, &hash).await?;
        tracing::info!(user_id = created.id, role = %created.role, "User created");
        Ok(created)
    }

    #[tracing::instrument(skip(self, user))]
    pub async fn update_user(&self, id: i32, user: &UpdateUser) -> AppResult<User> {
        if user.status == Some(UserStatus::Deleted) {
            return Err(AppError::BadRequest(
                "Use the delete operation to remove a user".to_string(),
            ));
        }
        let existing = self.repository.users.get_by_id(id).await?;
        if existing.status == UserStatus::Deleted {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }

        self.ensure_unique(user.login.as_deref(), user.email.as_deref(), Some(id)).await?;

        let hash = match user.password {
            Some(ref password) => Some(hash_password(password)?),
            None => None,
        };
        self.repository.users.update(id, user, hash.as_deref()).await
    }

    /// Update the caller's own profile; a password change needs the current password
    #[tracing::instrument(skip(self, profile))]
    pub async fn update_profile(&self, user_id: i32, profile: &UpdateProfile) -> AppResult<User> {
        let user = self.repository.users.get_by_id(user_id).await?;

        let hash = match profile.new_password {
            Some(ref new_password) => {
                let current = profile.current_password.as_deref().ok_or_else(|| {
                    AppError::BadRequest("Current password is required to change password".to_string())
                })?;
                if !verify_password(user.password.as_deref(), current) {
                    return Err(AppError::BadRequest("Current password is incorrect".to_string()));
                }
                Some(hash_password(new_password)?)
            }
            None => None,
        };

        self.ensure_unique(None, profile.email.as_deref(), Some(user_id)).await?;
        self.repository.users.update_profile(user_id, profile, hash.as_deref()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_role(&self, id: i32, role: Role) -> AppResult<User> {
        let user = self.repository.users.get_by_id(id).await?;
        if user.role == Role::Admin && role != Role::Admin && self.repository.users.count_admins().await? <= 1 {
            return Err(AppError::BusinessRule(
                "Cannot demote the last administrator".to_string(),
            ));
        }
        let updated = self.repository.users.update_role(id, role).await?;
        tracing::info!(user_id = id, from = %user.role, to = %role, "User role changed");
        Ok(updated)
    }

    /// Soft delete. Refused while the user has active loans or unpaid fines, unless forced.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, id: i32, force: bool) -> AppResult<()> {
        let user = self.repository.users.get_by_id(id).await?;
        if user.status == UserStatus::Deleted {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }
        if user.role == Role::Admin && self.repository.users.count_admins().await? <= 1 {
            return Err(AppError::BusinessRule(
                "Cannot delete the last administrator".to_string(),
            ));
        }

        if !force {
            let mut tx = self.repository.begin().await?;
            let active_loans = self.repository.loans.count_active_for_user(&mut tx, id).await?;
            let outstanding = self.repository.fines.outstanding_total(&mut tx, id).await?;
            tx.commit().await?;

            if active_loans > 0 {
                return Err(AppError::BusinessRule(format!(
                    "User has {} active loan(s)",
                    active_loans
                )));
            }
            if outstanding > rust_decimal::Decimal::ZERO {
                return Err(AppError::BusinessRule(format!(
                    "User has unpaid fines totalling {}",
                    outstanding
                )));
            }
        }

        self.repository.users.set_status(id, UserStatus::Deleted).await?;
        tracing::info!(user_id = id, force, "User deleted");
        Ok(())
    }

    /// Create the configured administrator when no administrator exists yet
    pub async fn ensure_bootstrap_admin(&self) -> AppResult<()> {
        let (Some(login), Some(password)) = (
            self.config.bootstrap_admin_login.as_deref(),
            self.config.bootstrap_admin_password.as_deref(),
        ) else {
            return Ok(());
        };

        if self.repository.users.count_admins().await? > 0 {
            return Ok(());
        }
        if self.repository.users.login_exists(login, None).await? {
            tracing::warn!("Bootstrap admin login '{}' is taken by a non-admin account", login);
            return Ok(());
        }

        let admin = CreateUser {
            login: login.to_string(),
            password: password.to_string(),
            firstname: None,
            lastname: None,
            email: None,
            phone: None,
            role: Some(Role::Admin),
        };
        let hash = hash_password(&admin.password)?;
        let created = self.repository.users.create(&admin, &hash).await?;
        tracing::info!(user_id = created.id, "Bootstrap administrator created");
        Ok(())
    }
}

/// Hash a password with argon2 and a random salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored argon2 hash
pub fn verify_password(stored: Option<&str>, password: &str) -> bool {
    let Some(stored) = stored else {
        return false;
    };
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(Some(&hash), "correct horse"));
        assert!(!verify_password(Some(&hash), "wrong horse"));
    }

    #[test]
    fn missing_or_garbage_hash_never_verifies() {
        assert!(!verify_password(None, "anything"));
        assert!(!verify_password(Some("not-a-hash"), "anything"));
    }
}
