//! Audit trail entries and their hash chain
//!
//! Each entry stores the hash of its predecessor and a SHA-256 over its own
//! content, so any rewrite of a past entry breaks every later link.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

/// `prev_hash` of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

text_enum! {
    AuditAction {
        Create => "create",
        Update => "update",
        Delete => "delete",
        Login => "login",
        Logout => "logout",
        Checkout => "checkout",
        Return => "return",
        Renew => "renew",
        MarkLost => "mark_lost",
        Reserve => "reserve",
        CancelReservation => "cancel_reservation",
        PayFine => "pay_fine",
        WaiveFine => "waive_fine",
        AssessFine => "assess_fine",
        StatusChange => "status_change",
    }
}

/// Stored audit entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: Option<i32>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<i32>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

/// Entry content before it is chained
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: Option<i32>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<i32>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
}

impl NewAuditEntry {
    pub fn new(
        actor_id: Option<i32>,
        action: AuditAction,
        entity_type: &str,
        entity_id: Option<i32>,
    ) -> Self {
        Self {
            actor_id,
            action,
            entity_type: entity_type.to_string(),
            entity_id,
            details: serde_json::Value::Null,
            ip_address: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }
}

/// Hash of an entry given its predecessor's hash.
///
/// `created_at` is truncated to microseconds, the precision PostgreSQL keeps.
pub fn chain_hash(
    prev_hash: &str,
    actor_id: Option<i32>,
    action: AuditAction,
    entity_type: &str,
    entity_id: Option<i32>,
    details: &serde_json::Value,
    created_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(b"|");
    hasher.update(actor_id.map(|id| id.to_string()).unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(action.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(entity_type.as_bytes());
    hasher.update(b"|");
    hasher.update(entity_id.map(|id| id.to_string()).unwrap_or_default().as_bytes());
    hasher.update(b"|");
    // serde_json::Value keeps object keys sorted, giving a canonical form
    hasher.update(details.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(created_at.to_rfc3339_opts(SecondsFormat::Micros, true).as_bytes());
    hex::encode(hasher.finalize())
}

impl AuditEntry {
    /// Recompute this entry's hash from its content
    pub fn expected_hash(&self) -> String {
        chain_hash(
            &self.prev_hash,
            self.actor_id,
            self.action,
            &self.entity_type,
            self.entity_id,
            &self.details,
            self.created_at,
        )
    }
}

/// Walk entries in id order and return the id of the first broken link
pub fn find_broken_link(entries: &[AuditEntry], mut prev_hash: String) -> Option<i64> {
    for entry in entries {
        if entry.prev_hash != prev_hash || entry.expected_hash() != entry.hash {
            return Some(entry.id);
        }
        prev_hash = entry.hash.clone();
    }
    None
}

/// Audit log filters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct AuditQuery {
    pub actor_id: Option<i32>,
    pub entity_type: Option<String>,
    pub entity_id: Option<i32>,
    pub action: Option<AuditAction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Result of a chain verification
#[derive(Debug, Serialize, ToSchema)]
pub struct ChainVerification {
    pub valid: bool,
    pub entries_checked: i64,
    pub first_broken_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn entry(id: i64, prev_hash: &str, details: serde_json::Value) -> AuditEntry {
        let created_at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, id as u32).unwrap();
        let hash = chain_hash(
            prev_hash,
            Some(1),
            AuditAction::Checkout,
            "loan",
            Some(id as i32),
            &details,
            created_at,
        );
        AuditEntry {
            id,
            actor_id: Some(1),
            action: AuditAction::Checkout,
            entity_type: "loan".to_string(),
            entity_id: Some(id as i32),
            details,
            ip_address: None,
            created_at,
            prev_hash: prev_hash.to_string(),
            hash,
        }
    }

    fn chain(n: i64) -> Vec<AuditEntry> {
        let mut prev = GENESIS_HASH.to_string();
        (1..=n)
            .map(|id| {
                let e = entry(id, &prev, json!({ "copy_id": id }));
                prev = e.hash.clone();
                e
            })
            .collect()
    }

    #[test]
    fn intact_chain_verifies() {
        let entries = chain(4);
        assert_eq!(find_broken_link(&entries, GENESIS_HASH.to_string()), None);
    }

    #[test]
    fn tampered_details_are_detected() {
        let mut entries = chain(4);
        entries[2].details = json!({ "copy_id": 99 });
        assert_eq!(find_broken_link(&entries, GENESIS_HASH.to_string()), Some(3));
    }

    #[test]
    fn removed_entry_is_detected() {
        let mut entries = chain(4);
        entries.remove(1);
        assert_eq!(find_broken_link(&entries, GENESIS_HASH.to_string()), Some(3));
    }

    #[test]
    fn hash_depends_on_key_content_not_order() {
        let a = json!({ "a": 1, "b": 2 });
        let b: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        let t = Utc::now();
        assert_eq!(
            chain_hash(GENESIS_HASH, None, AuditAction::Login, "user", Some(1), &a, t),
            chain_hash(GENESIS_HASH, None, AuditAction::Login, "user", Some(1), &b, t),
        );
    }
}
