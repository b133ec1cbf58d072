//! Circulation service tests against a live database
//!
//! Require PostgreSQL and Redis reachable with the settings in `config/`
//! (or `DATABASE_URL` / `REDIS_URL`).
//! Run with: cargo test --test circulation_tests -- --ignored

use std::sync::Arc;

use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use bibliotheca_server::{
    config::AppConfig,
    models::{
        book::CreateBook,
        copy::{CopyStatus, CreateCopy},
        loan::CreateLoan,
        reservation::ReservationStatus,
        user::CreateUser,
    },
    repository::Repository,
    services::{redis::RedisService, Services},
    sweeper::Sweeper,
};

struct TestEnv {
    pool: PgPool,
    config: AppConfig,
    services: Arc<Services>,
}

async fn setup() -> TestEnv {
    let config = AppConfig::load().expect("Failed to load configuration");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    let redis = RedisService::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");

    let services = Arc::new(Services::new(Repository::new(pool.clone()), &config, redis));
    TestEnv {
        pool,
        config,
        services,
    }
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

async fn member(env: &TestEnv) -> i32 {
    env.services
        .users
        .create_user(&CreateUser {
            login: unique("member"),
            password: "member-password".to_string(),
            firstname: None,
            lastname: None,
            email: None,
            phone: None,
            role: None,
        })
        .await
        .expect("Failed to create member")
        .id
}

/// Creates a book with `copies` copies and returns (book_id, copy ids)
async fn book_with_copies(env: &TestEnv, copies: usize) -> (i32, Vec<i32>) {
    let book = env
        .services
        .catalog
        .create_book(&CreateBook {
            isbn: None,
            title: unique("Circulation Book"),
            author: None,
            publisher: None,
            publication_year: None,
            language: None,
            subject: None,
            replacement_cost: None,
        })
        .await
        .expect("Failed to create book");

    let mut ids = Vec::new();
    for _ in 0..copies {
        let copy = env
            .services
            .catalog
            .create_copy(
                book.id,
                &CreateCopy {
                    barcode: unique("BC"),
                    location: None,
                    notes: None,
                    acquired_at: None,
                },
            )
            .await
            .expect("Failed to create copy");
        ids.push(copy.id);
    }
    (book.id, ids)
}

async fn checkout(env: &TestEnv, user_id: i32, copy_id: i32) -> i32 {
    env.services
        .loans
        .checkout(&CreateLoan {
            user_id,
            copy_id: Some(copy_id),
            barcode: None,
            force: false,
        })
        .await
        .expect("Checkout failed")
        .id
}

async fn copy_status(env: &TestEnv, copy_id: i32) -> CopyStatus {
    env.services
        .catalog
        .get_copy(copy_id)
        .await
        .expect("Failed to load copy")
        .status
}

#[tokio::test]
#[ignore]
async fn borrowing_another_copy_releases_the_held_one() {
    let env = setup().await;
    let lender = member(&env).await;
    let waiter = member(&env).await;
    let (book_id, copies) = book_with_copies(&env, 2).await;
    let (held, other) = (copies[0], copies[1]);

    let first = checkout(&env, lender, held).await;
    let second = checkout(&env, lender, other).await;
    let reservation = env
        .services
        .reservations
        .place(waiter, book_id)
        .await
        .expect("Failed to place reservation");

    env.services.loans.return_loan(first, false).await.expect("Return failed");
    assert_eq!(copy_status(&env, held).await, CopyStatus::Reserved);
    env.services.loans.return_loan(second, false).await.expect("Return failed");
    assert_eq!(copy_status(&env, other).await, CopyStatus::Available);

    // The waiting member takes the shelved copy instead of the one held for them
    checkout(&env, waiter, other).await;

    let closed = env.services.reservations.get(reservation.id).await.expect("reservation");
    assert_eq!(closed.status, ReservationStatus::Fulfilled);
    assert_eq!(copy_status(&env, held).await, CopyStatus::Available);
}

#[tokio::test]
#[ignore]
async fn sweeper_expires_lapsed_hold_and_hands_copy_on() {
    let env = setup().await;
    let lender = member(&env).await;
    let first_waiter = member(&env).await;
    let second_waiter = member(&env).await;
    let (book_id, copies) = book_with_copies(&env, 1).await;
    let copy_id = copies[0];

    let loan = checkout(&env, lender, copy_id).await;
    let first = env
        .services
        .reservations
        .place(first_waiter, book_id)
        .await
        .expect("Failed to place reservation");
    let second = env
        .services
        .reservations
        .place(second_waiter, book_id)
        .await
        .expect("Failed to place reservation");
    assert_eq!(second.queue_position, Some(2));

    env.services.loans.return_loan(loan, false).await.expect("Return failed");
    let ready = env.services.reservations.get(first.id).await.expect("reservation");
    assert_eq!(ready.status, ReservationStatus::Ready);
    assert_eq!(ready.copy_id, Some(copy_id));

    sqlx::query("UPDATE reservations SET hold_until = NOW() - INTERVAL '1 day' WHERE id = $1")
        .bind(first.id)
        .execute(&env.pool)
        .await
        .expect("Failed to backdate hold");

    let report = Sweeper::new(env.services.clone(), &env.config.sweeper)
        .run_cycle()
        .await
        .expect("Sweeper cycle failed");
    assert!(report.holds_expired >= 1);

    let expired = env.services.reservations.get(first.id).await.expect("reservation");
    assert_eq!(expired.status, ReservationStatus::Expired);

    let promoted = env.services.reservations.get(second.id).await.expect("reservation");
    assert_eq!(promoted.status, ReservationStatus::Ready);
    assert_eq!(promoted.copy_id, Some(copy_id));
    assert_eq!(copy_status(&env, copy_id).await, CopyStatus::Reserved);
}

#[tokio::test]
#[ignore]
async fn force_deleting_a_held_copy_cancels_the_hold() {
    let env = setup().await;
    let lender = member(&env).await;
    let waiter = member(&env).await;
    let (book_id, copies) = book_with_copies(&env, 1).await;
    let copy_id = copies[0];

    let loan = checkout(&env, lender, copy_id).await;
    let reservation = env
        .services
        .reservations
        .place(waiter, book_id)
        .await
        .expect("Failed to place reservation");
    env.services.loans.return_loan(loan, false).await.expect("Return failed");

    assert!(env.services.catalog.delete_copy(copy_id, false).await.is_err());
    env.services
        .catalog
        .delete_copy(copy_id, true)
        .await
        .expect("Forced delete failed");

    let cancelled = env.services.reservations.get(reservation.id).await.expect("reservation");
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);

    // Nothing is on hold any more, so a new copy goes straight out
    let fresh = env
        .services
        .catalog
        .create_copy(
            book_id,
            &CreateCopy {
                barcode: unique("BC"),
                location: None,
                notes: None,
                acquired_at: None,
            },
        )
        .await
        .expect("Failed to create copy");
    checkout(&env, lender, fresh.id).await;
}
