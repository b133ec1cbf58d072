//! User model, roles and access rights

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::AppError;

text_enum! {
    /// User role, from which access rights are derived
    Role {
        Member => "member",
        Librarian => "librarian",
        Admin => "admin",
    }
}

text_enum! {
    /// User account status
    UserStatus {
        Active => "active",
        Blocked => "blocked",
        Deleted => "deleted",
    }
}

/// Access level on a rights domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Rights {
    None,
    Read,
    Write,
}

/// Areas of the application guarded by rights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RightsDomain {
    Catalog,
    Users,
    Circulation,
    Fines,
    Audit,
}

impl RightsDomain {
    fn label(&self) -> &'static str {
        match self {
            RightsDomain::Catalog => "catalog",
            RightsDomain::Users => "users",
            RightsDomain::Circulation => "circulation",
            RightsDomain::Fines => "fines",
            RightsDomain::Audit => "audit",
        }
    }
}

/// Rights per domain
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRights {
    pub catalog: Rights,
    pub users: Rights,
    pub circulation: Rights,
    pub fines: Rights,
    pub audit: Rights,
}

impl UserRights {
    pub fn get(&self, domain: RightsDomain) -> Rights {
        match domain {
            RightsDomain::Catalog => self.catalog,
            RightsDomain::Users => self.users,
            RightsDomain::Circulation => self.circulation,
            RightsDomain::Fines => self.fines,
            RightsDomain::Audit => self.audit,
        }
    }
}

impl Role {
    pub fn rights(&self) -> UserRights {
        match self {
            Role::Member => UserRights {
                catalog: Rights::Read,
                users: Rights::None,
                circulation: Rights::None,
                fines: Rights::None,
                audit: Rights::None,
            },
            Role::Librarian => UserRights {
                catalog: Rights::Write,
                users: Rights::Write,
                circulation: Rights::Write,
                fines: Rights::Write,
                audit: Rights::Read,
            },
            Role::Admin => UserRights {
                catalog: Rights::Write,
                users: Rights::Write,
                circulation: Rights::Write,
                fines: Rights::Write,
                audit: Rights::Write,
            },
        }
    }
}

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub login: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Short user representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserShort {
    pub id: i32,
    pub login: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub nb_loans: i64,
    pub nb_late_loans: i64,
}

/// User query parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    pub name: Option<String>,
    pub login: Option<String>,
    pub role: Option<Role>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create user request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 3, message = "Login must be at least 3 characters"))]
    pub login: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

/// Update user request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(min = 3, message = "Login must be at least 3 characters"))]
    pub login: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<UserStatus>,
}

/// Update own profile request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfile {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Current password (required to change password)
    pub current_password: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: Option<String>,
}

/// Update role request (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRole {
    pub role: Role,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    /// Token id, used for revocation on logout
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn rights(&self) -> UserRights {
        self.role.rights()
    }

    pub fn has(&self, domain: RightsDomain, level: Rights) -> bool {
        self.rights().get(domain) >= level
    }

    pub fn require(&self, domain: RightsDomain, level: Rights) -> Result<(), AppError> {
        if self.has(domain, level) {
            Ok(())
        } else {
            let verb = if level == Rights::Write { "write" } else { "read" };
            Err(AppError::Authorization(format!(
                "Insufficient rights to {} {}",
                verb,
                domain.label()
            )))
        }
    }

    /// Members may always act on their own records
    pub fn require_self_or(
        &self,
        user_id: i32,
        domain: RightsDomain,
        level: Rights,
    ) -> Result<(), AppError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            self.require(domain, level)
        }
    }

    // Authorization checks
    pub fn require_read_catalog(&self) -> Result<(), AppError> {
        self.require(RightsDomain::Catalog, Rights::Read)
    }

    pub fn require_write_catalog(&self) -> Result<(), AppError> {
        self.require(RightsDomain::Catalog, Rights::Write)
    }

    pub fn require_read_users(&self) -> Result<(), AppError> {
        self.require(RightsDomain::Users, Rights::Read)
    }

    pub fn require_write_users(&self) -> Result<(), AppError> {
        self.require(RightsDomain::Users, Rights::Write)
    }

    pub fn require_read_circulation(&self) -> Result<(), AppError> {
        self.require(RightsDomain::Circulation, Rights::Read)
    }

    pub fn require_write_circulation(&self) -> Result<(), AppError> {
        self.require(RightsDomain::Circulation, Rights::Write)
    }

    pub fn require_read_fines(&self) -> Result<(), AppError> {
        self.require(RightsDomain::Fines, Rights::Read)
    }

    pub fn require_write_fines(&self) -> Result<(), AppError> {
        self.require(RightsDomain::Fines, Rights::Write)
    }

    pub fn require_read_audit(&self) -> Result<(), AppError> {
        self.require(RightsDomain::Audit, Rights::Read)
    }

    pub fn require_write_audit(&self) -> Result<(), AppError> {
        self.require(RightsDomain::Audit, Rights::Write)
    }

    /// Staff accounts are managed by administrators only
    pub fn require_manage_user(&self, target_role: Role) -> Result<(), AppError> {
        self.require_write_users()?;
        if target_role != Role::Member {
            self.require_admin()?;
        }
        Ok(())
    }

    /// Align the claims with the stored account.
    ///
    /// Blocked and deleted accounts lose access at once, and a role change
    /// applies to tokens issued before it.
    pub fn with_account(mut self, user: &User) -> Result<Self, AppError> {
        if user.status != UserStatus::Active {
            return Err(AppError::Authentication(format!("Account is {}", user.status)));
        }
        self.role = user.role;
        Ok(self)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require admin privileges
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator privileges required".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> UserClaims {
        UserClaims {
            sub: "alice".to_string(),
            user_id: 7,
            role,
            jti: "jti".to_string(),
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn member_reads_catalog_only() {
        let c = claims(Role::Member);
        assert!(c.require_read_catalog().is_ok());
        assert!(c.require_write_catalog().is_err());
        assert!(c.require_read_users().is_err());
        assert!(c.require_write_circulation().is_err());
    }

    #[test]
    fn librarian_reads_but_cannot_verify_audit() {
        let c = claims(Role::Librarian);
        assert!(c.require_write_circulation().is_ok());
        assert!(c.require(RightsDomain::Audit, Rights::Read).is_ok());
        assert!(c.require(RightsDomain::Audit, Rights::Write).is_err());
        assert!(c.require_admin().is_err());
    }

    #[test]
    fn self_access_bypasses_rights() {
        let c = claims(Role::Member);
        assert!(c.require_self_or(7, RightsDomain::Fines, Rights::Read).is_ok());
        assert!(matches!(
            c.require_self_or(8, RightsDomain::Fines, Rights::Read),
            Err(AppError::Authorization(_))
        ));
    }

    #[test]
    fn token_round_trip() {
        let c = claims(Role::Admin);
        let mut c = c;
        c.exp = Utc::now().timestamp() + 60;
        let token = c.create_token("secret").unwrap();
        let parsed = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.user_id, 7);
        assert_eq!(parsed.role, Role::Admin);
        assert!(UserClaims::from_token(&token, "other").is_err());
    }

    fn account(role: Role, status: UserStatus) -> User {
        User {
            id: 7,
            login: "alice".to_string(),
            password: None,
            firstname: None,
            lastname: None,
            email: None,
            phone: None,
            role,
            status,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn librarian_cannot_manage_staff_accounts() {
        let librarian = claims(Role::Librarian);
        assert!(librarian.require_manage_user(Role::Member).is_ok());
        assert!(matches!(
            librarian.require_manage_user(Role::Admin),
            Err(AppError::Authorization(_))
        ));
        assert!(librarian.require_manage_user(Role::Librarian).is_err());

        let admin = claims(Role::Admin);
        assert!(admin.require_manage_user(Role::Admin).is_ok());
        assert!(claims(Role::Member).require_manage_user(Role::Member).is_err());
    }

    #[test]
    fn inactive_accounts_lose_their_tokens() {
        for status in [UserStatus::Blocked, UserStatus::Deleted] {
            assert!(matches!(
                claims(Role::Member).with_account(&account(Role::Member, status)),
                Err(AppError::Authentication(_))
            ));
        }
    }

    #[test]
    fn stored_role_overrides_token_role() {
        let demoted = claims(Role::Admin)
            .with_account(&account(Role::Member, UserStatus::Active))
            .unwrap();
        assert_eq!(demoted.role, Role::Member);
        assert!(demoted.require_admin().is_err());
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Librarian".parse::<Role>().unwrap(), Role::Librarian);
        assert!("janitor".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }
}
