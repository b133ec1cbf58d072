//! API handlers for Bibliotheca REST endpoints

pub mod audit;
pub mod auth;
pub mod books;
pub mod copies;
pub mod fines;
pub mod health;
pub mod loans;
pub mod notifications;
pub mod openapi;
pub mod reservations;
pub mod users;

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppError,
    models::{
        audit::AuditEntry,
        book::BookShort,
        fine::Fine,
        loan::LoanDetails,
        notification::Notification,
        user::{UserClaims, UserShort},
    },
    repository::page_bounds,
    AppState,
};

/// Paginated response wrapper
#[derive(Serialize, ToSchema)]
#[aliases(
    UserPage = PaginatedResponse<UserShort>,
    BookPage = PaginatedResponse<BookShort>,
    LoanPage = PaginatedResponse<LoanDetails>,
    FinePage = PaginatedResponse<Fine>,
    NotificationPage = PaginatedResponse<Notification>,
    AuditPage = PaginatedResponse<AuditEntry>
)]
pub struct PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// List of items
    pub items: Vec<T>,
    /// Total number of items
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Items per page
    pub per_page: i64,
}

impl<T> PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// Wrap a page of results, echoing the effective paging parameters
    pub fn new(items: Vec<T>, total: i64, page: Option<i64>, per_page: Option<i64>) -> Self {
        let (page, per_page, _) = page_bounds(page, per_page);
        Self {
            items,
            total,
            page,
            per_page,
        }
    }
}

/// `?force=true` on destructive operations
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ForceParams {
    #[serde(default)]
    pub force: bool,
}

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        if state.services.redis.is_token_revoked(&claims.jti).await? {
            return Err(AppError::Authentication("Token has been revoked".to_string()));
        }

        let account = match state.services.users.get_by_id(claims.user_id).await {
            Ok(user) => user,
            Err(AppError::NotFound(_)) => {
                return Err(AppError::Authentication("Account no longer exists".to_string()))
            }
            Err(e) => return Err(e),
        };

        Ok(AuthenticatedUser(claims.with_account(&account)?))
    }
}

/// Caller address for the audit trail: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let ip = header("x-forwarded-for")
            .or_else(|| header("x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });

        Ok(ClientIp(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn client_ip(request: Request<()>) -> Option<String> {
        let (mut parts, _) = request.into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        ip
    }

    #[tokio::test]
    async fn forwarded_for_takes_first_hop() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "10.0.0.2")
            .body(())
            .unwrap();
        assert_eq!(client_ip(request).await.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn falls_back_to_socket_peer() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_ip(request).await.as_deref(), Some("192.0.2.1"));
    }

    #[test]
    fn pagination_echoes_effective_bounds() {
        let page = PaginatedResponse::<Fine>::new(vec![], 0, None, Some(1000));
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 200);
    }
}
