//! Audit log repository (append-only)

use chrono::{SubsecRound, Utc};
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::AppResult,
    models::audit::{chain_hash, AuditEntry, AuditQuery, NewAuditEntry, GENESIS_HASH},
};

use super::page_bounds;

const AUDIT_COLUMNS: &str = "id, actor_id, action, entity_type, entity_id, details, ip_address, \
                             created_at, prev_hash, hash";

/// Advisory lock key serializing appends to the chain
const AUDIT_CHAIN_LOCK: i64 = 0x0B1B_A0D1;

#[derive(Clone)]
pub struct AuditRepository {
    pool: Pool<Postgres>,
}

impl AuditRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Append an entry, linking it to the current chain head
    pub async fn append(&self, entry: &NewAuditEntry) -> AppResult<AuditEntry> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(AUDIT_CHAIN_LOCK)
            .execute(&mut *tx)
            .await?;

        let prev_hash: String = sqlx::query_scalar("SELECT hash FROM audit_log ORDER BY id DESC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let created_at = Utc::now().trunc_subsecs(6);
        let hash = chain_hash(
            &prev_hash,
            entry.actor_id,
            entry.action,
            &entry.entity_type,
            entry.entity_id,
            &entry.details,
            created_at,
        );

        let stored = sqlx::query_as::<_, AuditEntry>(&format!(
            r#"
            INSERT INTO audit_log (actor_id, action, entity_type, entity_id, details, ip_address,
                                   created_at, prev_hash, hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            AUDIT_COLUMNS
        ))
        .bind(entry.actor_id)
        .bind(entry.action)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .bind(created_at)
        .bind(&prev_hash)
        .bind(&hash)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &AuditQuery) {
        builder.push(" WHERE TRUE");
        if let Some(actor_id) = query.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id);
        }
        if let Some(ref entity_type) = query.entity_type {
            builder.push(" AND entity_type = ").push_bind(entity_type.clone());
        }
        if let Some(entity_id) = query.entity_id {
            builder.push(" AND entity_id = ").push_bind(entity_id);
        }
        if let Some(action) = query.action {
            builder.push(" AND action = ").push_bind(action);
        }
        if let Some(from) = query.from {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = query.to {
            builder.push(" AND created_at <= ").push_bind(to);
        }
    }

    pub async fn search(&self, query: &AuditQuery) -> AppResult<(Vec<AuditEntry>, i64)> {
        let (_, per_page, offset) = page_bounds(query.page, query.per_page);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_log");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM audit_log", AUDIT_COLUMNS));
        Self::push_filters(&mut select, query);
        select
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let entries = select.build_query_as::<AuditEntry>().fetch_all(&self.pool).await?;
        Ok((entries, total))
    }

    /// Entries with id greater than `after_id`, in chain order
    pub async fn batch_after(&self, after_id: i64, limit: i64) -> AppResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(&format!(
            "SELECT {} FROM audit_log WHERE id > $1 ORDER BY id LIMIT $2",
            AUDIT_COLUMNS
        ))
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
