//! User management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        audit::{AuditAction, NewAuditEntry},
        user::{
            CreateUser, Rights, RightsDomain, Role, UpdateProfile, UpdateRole, UpdateUser, User,
            UserQuery,
        },
    },
};

use super::{AuthenticatedUser, ClientIp, ForceParams, PaginatedResponse, UserPage};

/// List users with search and pagination
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(UserQuery),
    responses(
        (status = 200, description = "List of users", body = UserPage),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Insufficient rights")
    )
)]
pub async fn list_users(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<UserPage>> {
    claims.require_read_users()?;

    let (users, total) = state.services.users.search(&query).await?;
    Ok(Json(PaginatedResponse::new(users, total, query.page, query.per_page)))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    claims.require_self_or(id, RightsDomain::Users, Rights::Read)?;

    let user = state.services.users.get_by_id(id).await?;
    Ok(Json(user))
}

/// Create a new user
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Login or email already exists")
    )
)]
pub async fn create_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Json(user): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    claims.require_manage_user(user.role.unwrap_or(Role::Member))?;
    user.validate()?;

    let created = state.services.users.create_user(&user).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::Create, "user", Some(created.id))
                .with_details(json!({ "login": created.login, "role": created.role }))
                .with_ip(ip),
        )
        .await;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Update an existing user
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Staff accounts are managed by administrators"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Login or email already exists")
    )
)]
pub async fn update_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
    Json(user): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    claims.require_write_users()?;
    let target = state.services.users.get_by_id(id).await?;
    claims.require_manage_user(target.role)?;
    user.validate()?;

    let updated = state.services.users.update_user(id, &user).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::Update, "user", Some(id))
                .with_details(json!({
                    "login": user.login,
                    "status": user.status,
                    "password_changed": user.password.is_some(),
                }))
                .with_ip(ip),
        )
        .await;

    Ok(Json(updated))
}

/// Delete a user (soft delete)
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        ForceParams
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Staff accounts are managed by administrators"),
        (status = 404, description = "User not found"),
        (status = 422, description = "User has active loans or unpaid fines")
    )
)]
pub async fn delete_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
    Query(params): Query<ForceParams>,
) -> AppResult<StatusCode> {
    claims.require_write_users()?;
    let target = state.services.users.get_by_id(id).await?;
    claims.require_manage_user(target.role)?;

    state.services.users.delete_user(id, params.force).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::Delete, "user", Some(id))
                .with_details(json!({ "force": params.force }))
                .with_ip(ip),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Update own profile (names, contact, password)
#[utoipa::path(
    put,
    path = "/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Invalid input or wrong current password"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_my_profile(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Json(profile): Json<UpdateProfile>,
) -> AppResult<Json<User>> {
    profile.validate()?;

    let updated = state.services.users.update_profile(claims.user_id, &profile).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::Update, "user", Some(claims.user_id))
                .with_details(json!({
                    "profile": true,
                    "password_changed": profile.new_password.is_some(),
                }))
                .with_ip(ip),
        )
        .await;

    Ok(Json(updated))
}

/// Change a user's role (admin only)
#[utoipa::path(
    put,
    path = "/users/{id}/role",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    request_body = UpdateRole,
    responses(
        (status = 200, description = "Role updated", body = User),
        (status = 403, description = "Admin privileges required"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Would remove the last administrator")
    )
)]
pub async fn update_role(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i32>,
    Json(request): Json<UpdateRole>,
) -> AppResult<Json<User>> {
    claims.require_admin()?;

    let updated = state.services.users.update_role(id, request.role).await?;

    state
        .services
        .audit
        .record(
            NewAuditEntry::new(Some(claims.user_id), AuditAction::Update, "user", Some(id))
                .with_details(json!({ "role": request.role }))
                .with_ip(ip),
        )
        .await;

    Ok(Json(updated))
}
