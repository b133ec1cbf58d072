//! Audit trail recording and verification

use crate::{
    error::AppResult,
    models::audit::{find_broken_link, AuditEntry, AuditQuery, ChainVerification, NewAuditEntry, GENESIS_HASH},
    repository::Repository,
};

const VERIFY_BATCH: i64 = 1000;

#[derive(Clone)]
pub struct AuditService {
    repository: Repository,
}

impl AuditService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Append an entry. Failures are logged, never returned.
    pub async fn record(&self, entry: NewAuditEntry) {
        let action = entry.action;
        let entity_type = entry.entity_type.clone();
        let entity_id = entry.entity_id;
        if let Err(e) = self.repository.audit.append(&entry).await {
            tracing::warn!(
                action = %action,
                entity_type = %entity_type,
                entity_id = ?entity_id,
                "Failed to record audit entry: {}",
                e
            );
        }
    }

    pub async fn list(&self, query: &AuditQuery) -> AppResult<(Vec<AuditEntry>, i64)> {
        self.repository.audit.search(query).await
    }

    /// Walk the whole log in id order and report the first broken link
    #[tracing::instrument(skip(self))]
    pub async fn verify_chain(&self) -> AppResult<ChainVerification> {
        let mut prev_hash = GENESIS_HASH.to_string();
        let mut after_id = 0i64;
        let mut checked = 0i64;

        loop {
            let batch = self.repository.audit.batch_after(after_id, VERIFY_BATCH).await?;
            if batch.is_empty() {
                break;
            }

            if let Some(broken) = find_broken_link(&batch, prev_hash.clone()) {
                checked += batch.iter().take_while(|e| e.id != broken).count() as i64;
                tracing::warn!(entry_id = broken, "Audit chain broken");
                return Ok(ChainVerification {
                    valid: false,
                    entries_checked: checked,
                    first_broken_id: Some(broken),
                });
            }

            checked += batch.len() as i64;
            if let Some(last) = batch.last() {
                after_id = last.id;
                prev_hash = last.hash.clone();
            }
        }

        tracing::info!(entries = checked, "Audit chain verified");
        Ok(ChainVerification {
            valid: true,
            entries_checked: checked,
            first_broken_id: None,
        })
    }
}
