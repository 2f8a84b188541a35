//! C12 Audit & Security Log: append-only streams of privileged actions and
//! access denials, sharing the hash-chained log primitive with the point
//! ledger.

use crate::error::CoreError;
use crate::ledger::{AppendOnlyLog, LogEntryKind};
use crate::types::{AuditEvent, SecurityEvent, SecurityEventKind};
use chrono::{DateTime, Utc};

pub struct AuditLog {
    log: AppendOnlyLog,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            log: AppendOnlyLog::new(),
        }
    }

    pub fn from_log(log: AppendOnlyLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &AppendOnlyLog {
        &self.log
    }

    pub fn record_audit(&mut self, event: AuditEvent) -> Result<(), CoreError> {
        self.log
            .append(&event.resource_id.clone(), LogEntryKind::Audit, &event)?;
        Ok(())
    }

    pub fn record_security(&mut self, event: SecurityEvent) -> Result<(), CoreError> {
        let subject = event.actor_id.clone().unwrap_or_else(|| "anonymous".to_string());
        self.log.append(&subject, LogEntryKind::Security, &event)?;
        Ok(())
    }

    pub fn audit_events(
        &self,
        actor_id: Option<&str>,
        resource_type: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<AuditEvent> {
        self.log
            .entries()
            .iter()
            .filter(|e| e.kind == LogEntryKind::Audit)
            .filter_map(|e| serde_json::from_value::<AuditEvent>(e.payload.clone()).ok())
            .filter(|ev| actor_id.map(|a| ev.actor_id == a).unwrap_or(true))
            .filter(|ev| resource_type.map(|r| ev.resource_type == r).unwrap_or(true))
            .filter(|ev| from.map(|f| ev.at >= f).unwrap_or(true))
            .filter(|ev| to.map(|t| ev.at <= t).unwrap_or(true))
            .collect()
    }

    pub fn security_events(&self, kind: Option<SecurityEventKind>) -> Vec<SecurityEvent> {
        self.log
            .entries()
            .iter()
            .filter(|e| e.kind == LogEntryKind::Security)
            .filter_map(|e| serde_json::from_value::<SecurityEvent>(e.payload.clone()).ok())
            .filter(|ev| kind.map(|k| ev.kind == k).unwrap_or(true))
            .collect()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience constructor for the Tenancy Gate's cross-shop denial event.
pub fn unauthorized_shop_access(
    actor_id: Option<String>,
    attempted_shop_id: &str,
    principal_shop_id: Option<&str>,
    path: &str,
    method: &str,
) -> SecurityEvent {
    SecurityEvent {
        actor_id,
        kind: SecurityEventKind::UnauthorizedShopAccessAttempt,
        details: serde_json::json!({
            "attempted_shop_id": attempted_shop_id,
            "principal_shop_id": principal_shop_id,
            "path": path,
            "method": method,
        }),
        at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_filters_audit_events() {
        let mut log = AuditLog::new();
        log.record_audit(AuditEvent {
            actor_id: "admin-1".to_string(),
            action: "approve_shop".to_string(),
            resource_type: "shop".to_string(),
            resource_id: "shop-1".to_string(),
            before: Some(serde_json::json!({"status": "pending"})),
            after: Some(serde_json::json!({"status": "active"})),
            ip: Some("127.0.0.1".to_string()),
            at: Utc::now(),
        })
        .unwrap();

        let events = log.audit_events(Some("admin-1"), Some("shop"), None, None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "approve_shop");
    }

    #[test]
    fn security_event_stream_is_tamper_evident() {
        let mut log = AuditLog::new();
        log.record_security(unauthorized_shop_access(
            Some("shop-owner-1".to_string()),
            "shop-2",
            Some("shop-1"),
            "/api/shops/shop-2/reservations",
            "GET",
        ))
        .unwrap();
        assert!(log.log().verify_chain());
        assert_eq!(log.security_events(None).len(), 1);
    }
}
