//! C1 Credential Store: hashed password / social-identity lookup, refresh
//! token records.

use crate::error::CoreError;
use crate::types::{Principal, PrincipalStatus, RefreshTokenRecord};
use chrono::Utc;
use std::collections::HashMap;

/// In-memory credential store used by tests and as the shape the Postgres
/// implementation in `storage` mirrors. Passwords are never stored or
/// compared in plaintext.
#[derive(Debug, Default)]
pub struct CredentialStore {
    by_email: HashMap<String, Principal>,
    password_hashes: HashMap<String, String>,
    social_identities: HashMap<(String, String), String>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_password_principal(&mut self, principal: Principal, password_hash: String) {
        self.password_hashes
            .insert(principal.id.clone(), password_hash);
        self.by_email.insert(principal.email.clone(), principal);
    }

    pub fn register_social_identity(&mut self, provider: &str, provider_user_id: &str, principal: Principal) {
        self.social_identities.insert(
            (provider.to_string(), provider_user_id.to_string()),
            principal.id.clone(),
        );
        self.by_email.insert(principal.email.clone(), principal);
    }

    pub fn find_by_email(&self, email: &str) -> Option<Principal> {
        self.by_email.get(email).cloned()
    }

    pub fn find_by_id(&self, id: &str) -> Option<Principal> {
        self.by_email.values().find(|p| p.id == id).cloned()
    }

    pub fn find_by_social_identity(&self, provider: &str, provider_user_id: &str) -> Option<Principal> {
        let principal_id = self
            .social_identities
            .get(&(provider.to_string(), provider_user_id.to_string()))?;
        self.find_by_id(principal_id)
    }

    /// Constant-time comparison against the stored hash. Hashing itself is
    /// performed by the caller (the service crate owns the password-hashing
    /// scheme); the store only ever sees opaque digests.
    pub fn verify_password(&self, principal_id: &str, candidate_hash: &str) -> bool {
        match self.password_hashes.get(principal_id) {
            Some(stored) => constant_time_eq(stored.as_bytes(), candidate_hash.as_bytes()),
            None => false,
        }
    }

    /// Updates status in place, leaving the password hash and social
    /// bindings untouched. Used by admin suspend/reactivate/delete actions.
    pub fn update_status(&mut self, principal_id: &str, status: PrincipalStatus) -> Result<Principal, CoreError> {
        let principal = self
            .by_email
            .values_mut()
            .find(|p| p.id == principal_id)
            .ok_or_else(|| CoreError::not_found("principal", principal_id))?;
        principal.status = status;
        Ok(principal.clone())
    }

    pub fn store_refresh_token(&mut self, record: RefreshTokenRecord) {
        self.refresh_tokens.insert(record.token.clone(), record);
    }

    pub fn find_refresh_token(&self, token: &str) -> Option<RefreshTokenRecord> {
        self.refresh_tokens.get(token).cloned()
    }

    pub fn revoke_refresh_token(&mut self, token: &str) -> Result<(), CoreError> {
        let record = self
            .refresh_tokens
            .get_mut(token)
            .ok_or_else(|| CoreError::not_found("refresh_token", token))?;
        record.revoked_at = Some(Utc::now());
        Ok(())
    }

    pub fn revoke_all_for_user(&mut self, user_id: &str) {
        let now = Utc::now();
        for record in self.refresh_tokens.values_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(now);
            }
        }
    }

    /// Active (non-revoked, non-expired) sessions for a user, oldest first —
    /// used by the Token Service to enforce the max-sessions cap.
    pub fn active_sessions_for_user(&self, user_id: &str) -> Vec<RefreshTokenRecord> {
        let now = Utc::now();
        let mut sessions: Vec<_> = self
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id && r.is_usable(now))
            .cloned()
            .collect();
        sessions.sort_by_key(|r| r.issued_at);
        sessions
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PrincipalStatus, Role};

    fn sample_principal(id: &str, email: &str) -> Principal {
        Principal {
            id: id.to_string(),
            email: email.to_string(),
            role: Role::Customer,
            shop_id: None,
            status: PrincipalStatus::Active,
        }
    }

    #[test]
    fn verifies_password_in_constant_time() {
        let mut store = CredentialStore::new();
        store.register_password_principal(sample_principal("u1", "a@example.com"), "hash-abc".to_string());
        assert!(store.verify_password("u1", "hash-abc"));
        assert!(!store.verify_password("u1", "hash-xyz"));
    }

    #[test]
    fn role_change_is_visible_on_rehydration() {
        let mut store = CredentialStore::new();
        store.register_password_principal(sample_principal("u1", "a@example.com"), "hash".to_string());
        let mut p = store.find_by_id("u1").unwrap();
        p.role = Role::Admin;
        store.by_email.insert(p.email.clone(), p);
        assert_eq!(store.find_by_id("u1").unwrap().role, Role::Admin);
    }

    #[test]
    fn revoke_all_for_user_marks_every_session() {
        let mut store = CredentialStore::new();
        for i in 0..3 {
            store.store_refresh_token(RefreshTokenRecord {
                id: format!("s{i}"),
                user_id: "u1".to_string(),
                token: format!("tok{i}"),
                device_fingerprint: "dev".to_string(),
                issued_at: Utc::now(),
                expires_at: Utc::now() + chrono::Duration::days(7),
                revoked_at: None,
            });
        }
        store.revoke_all_for_user("u1");
        assert!(store.active_sessions_for_user("u1").is_empty());
    }
}
