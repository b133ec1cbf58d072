//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{
    audit, auth, books, copies, fines, health, loans, notifications, reservations, users,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bibliotheca API",
        version = "1.0.0",
        description = "Library Management System REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::logout,
        auth::me,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        users::update_my_profile,
        users::update_role,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::list_copies,
        books::create_copy,
        // Copies
        copies::get_copy,
        copies::get_copy_by_barcode,
        copies::update_copy,
        copies::change_copy_status,
        copies::delete_copy,
        // Loans
        loans::list_loans,
        loans::get_loan,
        loans::get_user_loans,
        loans::create_loan,
        loans::return_loan,
        loans::return_by_barcode,
        loans::renew_loan,
        loans::mark_lost,
        loans::assess_damage,
        // Reservations
        reservations::place_reservation,
        reservations::get_reservation,
        reservations::cancel_reservation,
        reservations::get_user_reservations,
        reservations::book_queue,
        // Fines
        fines::list_fines,
        fines::get_fine,
        fines::get_user_fines,
        fines::pay_fine,
        fines::waive_fine,
        // Notifications
        notifications::list_notifications,
        notifications::unread_count,
        notifications::mark_read,
        notifications::mark_all_read,
        // Audit
        audit::list_audit,
        audit::verify_chain,
    ),
    components(
        schemas(
            // Pages
            crate::api::UserPage,
            crate::api::BookPage,
            crate::api::LoanPage,
            crate::api::FinePage,
            crate::api::NotificationPage,
            crate::api::AuditPage,
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::MeResponse,
            // Users
            crate::models::user::User,
            crate::models::user::UserShort,
            crate::models::user::UserQuery,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            crate::models::user::UpdateProfile,
            crate::models::user::UpdateRole,
            crate::models::user::UserRights,
            crate::models::user::Rights,
            crate::models::user::Role,
            crate::models::user::UserStatus,
            // Catalog
            crate::models::book::Book,
            crate::models::book::BookShort,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::copy::BookCopy,
            crate::models::copy::CopyStatus,
            crate::models::copy::CreateCopy,
            crate::models::copy::UpdateCopy,
            crate::models::copy::ChangeCopyStatus,
            // Circulation
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanStatus,
            crate::models::loan::CreateLoan,
            crate::models::loan::ReturnLoan,
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationDetails,
            crate::models::reservation::ReservationStatus,
            crate::models::reservation::CreateReservation,
            // Fines
            crate::models::fine::Fine,
            crate::models::fine::FineReason,
            crate::models::fine::FineStatus,
            crate::models::fine::FineBalance,
            crate::models::fine::PayFine,
            crate::models::fine::WaiveFine,
            crate::models::fine::AssessDamage,
            fines::UserFines,
            // Notifications
            crate::models::notification::Notification,
            crate::models::notification::NotificationKind,
            crate::models::notification::UnreadCount,
            notifications::MarkAllReadResponse,
            // Audit
            crate::models::audit::AuditEntry,
            crate::models::audit::AuditAction,
            crate::models::audit::ChainVerification,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "users", description = "User management"),
        (name = "books", description = "Catalog management"),
        (name = "copies", description = "Physical copies"),
        (name = "loans", description = "Loan management"),
        (name = "reservations", description = "Reservation queue"),
        (name = "fines", description = "Fines and payments"),
        (name = "notifications", description = "Member notifications"),
        (name = "audit", description = "Tamper-evident audit log")
    )
)]
pub struct ApiDoc;

/// Registers the JWT bearer scheme referenced by secured paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_circulation_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/loans", "/loans/{id}/return", "/reservations", "/fines/{id}/pay", "/audit/verify"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
