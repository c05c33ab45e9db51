//! Audit events, persisted records and the chain seal.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// `previous_hash` of the first record of every partition.
pub const GENESIS_HASH: &str = "";

/// What the caller knows about an audited action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub principal_id: String,
    pub principal_name: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub success: bool,
    pub source_ip: Option<String>,
    #[schema(value_type = Object)]
    pub details: Value,
    #[schema(value_type = Object)]
    pub risk_flags: Value,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        principal_id: impl Into<String>,
        principal_name: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            principal_name: principal_name.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            success: true,
            source_ip: None,
            details: Value::Object(serde_json::Map::new()),
            risk_flags: Value::Object(serde_json::Map::new()),
        }
    }

    #[must_use]
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    #[must_use]
    pub fn with_source_ip(mut self, source_ip: Option<String>) -> Self {
        self.source_ip = source_ip;
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn with_risk_flags(mut self, risk_flags: Value) -> Self {
        self.risk_flags = risk_flags;
        self
    }

    /// Seal the event onto the chain head. `sequence_id` stays 0 until the
    /// store assigns one.
    #[must_use]
    pub fn seal(self, timestamp: i64, previous_hash: &str) -> AuditRecord {
        let hash = chain_hash(
            &self.principal_id,
            &self.action,
            &self.resource_type,
            &self.resource_id,
            timestamp,
            previous_hash,
        );
        AuditRecord {
            sequence_id: 0,
            principal_id: self.principal_id,
            principal_name: self.principal_name,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            success: self.success,
            source_ip: self.source_ip,
            details: self.details,
            risk_flags: self.risk_flags,
            timestamp,
            hash,
            previous_hash: previous_hash.to_string(),
        }
    }
}

/// One link of an audit chain. Append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditRecord {
    pub sequence_id: i64,
    pub principal_id: String,
    pub principal_name: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub success: bool,
    pub source_ip: Option<String>,
    #[schema(value_type = Object)]
    pub details: Value,
    #[schema(value_type = Object)]
    pub risk_flags: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub hash: String,
    pub previous_hash: String,
}

impl AuditRecord {
    /// Recompute this record's hash from its own fields on top of `previous_hash`.
    #[must_use]
    pub fn expected_hash(&self, previous_hash: &str) -> String {
        chain_hash(
            &self.principal_id,
            &self.action,
            &self.resource_type,
            &self.resource_id,
            self.timestamp,
            previous_hash,
        )
    }
}

// Field order is part of the hash format.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SealInput<'a> {
    principal_id: &'a str,
    action: &'a str,
    resource_type: &'a str,
    resource_id: &'a str,
    timestamp: i64,
    previous_hash: &'a str,
}

/// SHA-256 (lowercase hex) over the compact JSON encoding of the sealed fields.
#[must_use]
pub fn chain_hash(
    principal_id: &str,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    timestamp: i64,
    previous_hash: &str,
) -> String {
    let input = SealInput {
        principal_id,
        action,
        resource_type,
        resource_id,
        timestamp,
        previous_hash,
    };
    // Serializing borrowed strings and an integer cannot fail.
    let canonical = serde_json::to_vec(&input).unwrap_or_default();
    format!("{:x}", Sha256::digest(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_encoding_is_stable() {
        let input = SealInput {
            principal_id: "admin_001",
            action: "USER_BAN",
            resource_type: "user",
            resource_id: "42",
            timestamp: 1_700_000_000_000,
            previous_hash: "",
        };
        let encoded = serde_json::to_string(&input).unwrap_or_default();
        assert_eq!(
            encoded,
            r#"{"principalId":"admin_001","action":"USER_BAN","resourceType":"user","resourceId":"42","timestamp":1700000000000,"previousHash":""}"#
        );
    }

    #[test]
    fn hash_is_lowercase_sha256_hex() {
        let hash = chain_hash("a", "b", "c", "d", 1, "");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_depends_on_previous_hash() {
        let first = chain_hash("a", "b", "c", "d", 1, "");
        let second = chain_hash("a", "b", "c", "d", 1, &first);
        assert_ne!(first, second);
    }

    #[test]
    fn unsealed_fields_do_not_change_the_hash() {
        let base = AuditEvent::new("admin_001", "Root", "ROOM_KICK", "room", "r-7");
        let noisy = base
            .clone()
            .with_success(false)
            .with_source_ip(Some("10.0.0.1".to_string()))
            .with_details(json!({"reason": "abuse"}))
            .with_risk_flags(json!({"high_value": true}));
        assert_eq!(base.seal(5, "").hash, noisy.seal(5, "").hash);
    }

    #[test]
    fn expected_hash_matches_seal() {
        let record = AuditEvent::new("admin_001", "Root", "ROOM_KICK", "room", "r-7").seal(9, "abc");
        assert_eq!(record.expected_hash("abc"), record.hash);
        assert_ne!(record.expected_hash(""), record.hash);
        assert_eq!(record.previous_hash, "abc");
    }
}
