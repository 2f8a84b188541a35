//! C2 Token Service: issue/verify access + refresh tokens, device-bound
//! sessions, rotation.

use crate::config::CoreConfig;
use crate::credentials::CredentialStore;
use crate::error::CoreError;
use crate::types::{AccessTokenClaims, DeviceInfo, Principal, RefreshTokenRecord, TokenPair};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use uuid::Uuid;

pub struct TokenService<'a> {
    secret: Vec<u8>,
    config: &'a CoreConfig,
}

impl<'a> TokenService<'a> {
    pub fn new(secret: impl Into<Vec<u8>>, config: &'a CoreConfig) -> Self {
        Self {
            secret: secret.into(),
            config,
        }
    }

    /// Issue a fresh access/refresh pair. Caps active sessions at
    /// `max_sessions_per_user`, revoking the oldest excess sessions.
    pub fn issue(
        &self,
        credentials: &mut CredentialStore,
        principal: &Principal,
        device: &DeviceInfo,
    ) -> Result<TokenPair, CoreError> {
        let access_token = self.sign_access_token(principal)?;
        let refresh_token = generate_opaque_token();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(self.config.refresh_token_ttl).unwrap();

        credentials.store_refresh_token(RefreshTokenRecord {
            id: Uuid::new_v4().to_string(),
            user_id: principal.id.clone(),
            token: refresh_token.clone(),
            device_fingerprint: device.device_fingerprint.clone(),
            issued_at: now,
            expires_at,
            revoked_at: None,
        });

        let sessions = credentials.active_sessions_for_user(&principal.id);
        let excess = sessions
            .len()
            .saturating_sub(self.config.max_sessions_per_user);
        for session in sessions.into_iter().take(excess) {
            credentials.revoke_refresh_token(&session.token)?;
        }

        Ok(TokenPair {
            access_token,
            refresh_token,
            refresh_expires_at: expires_at,
        })
    }

    /// Rotates: mints a new pair and revokes the presented refresh token.
    /// Fails `expired`, `revoked`, or `not_found`.
    pub fn refresh(
        &self,
        credentials: &mut CredentialStore,
        refresh_token: &str,
    ) -> Result<TokenPair, CoreError> {
        let record = credentials
            .find_refresh_token(refresh_token)
            .ok_or_else(|| CoreError::AuthInvalid("not_found".to_string()))?;

        if record.revoked_at.is_some() {
            return Err(CoreError::AuthInvalid("revoked".to_string()));
        }
        if record.expires_at <= Utc::now() {
            return Err(CoreError::AuthInvalid("expired".to_string()));
        }

        let principal = credentials
            .find_by_id(&record.user_id)
            .ok_or_else(|| CoreError::AuthInvalid("user_not_found".to_string()))?;

        credentials.revoke_refresh_token(refresh_token)?;

        self.issue(
            credentials,
            &principal,
            &DeviceInfo {
                device_fingerprint: record.device_fingerprint,
            },
        )
    }

    pub fn revoke_principal(&self, credentials: &mut CredentialStore, principal_id: &str) {
        credentials.revoke_all_for_user(principal_id);
    }

    fn sign_access_token(&self, principal: &Principal) -> Result<String, CoreError> {
        let now = Utc::now();
        let exp = now + chrono::Duration::from_std(self.config.access_token_ttl).unwrap();
        let claims = AccessTokenClaims {
            sub: principal.id.clone(),
            role: principal.role,
            shop_id: principal.shop_id.clone(),
            issued_at: now,
            exp: exp.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| CoreError::Internal(format!("failed to sign access token: {e}")))
    }

    /// Verifies signature and expiry only. Callers MUST re-hydrate the
    /// principal from the credential store and check for role drift — this
    /// method does not have access to live state.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, CoreError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(|e| CoreError::AuthInvalid(format!("invalid_token: {e}")))?;
        Ok(data.claims)
    }
}

fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

mod hex {
    pub fn encode(bytes: [u8; 32]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PrincipalStatus, Role};

    fn sample_principal() -> Principal {
        Principal {
            id: "u1".to_string(),
            email: "a@example.com".to_string(),
            role: Role::Customer,
            shop_id: None,
            status: PrincipalStatus::Active,
        }
    }

    #[test]
    fn issue_then_verify_roundtrips_claims() {
        let config = CoreConfig::default();
        let service = TokenService::new(b"test-secret".to_vec(), &config);
        let mut credentials = CredentialStore::new();
        let principal = sample_principal();
        credentials.register_password_principal(principal.clone(), "hash".to_string());

        let pair = service
            .issue(
                &mut credentials,
                &principal,
                &DeviceInfo {
                    device_fingerprint: "device-1".to_string(),
                },
            )
            .unwrap();

        let claims = service.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn refresh_rotates_and_revokes_predecessor() {
        let config = CoreConfig::default();
        let service = TokenService::new(b"test-secret".to_vec(), &config);
        let mut credentials = CredentialStore::new();
        let principal = sample_principal();
        credentials.register_password_principal(principal.clone(), "hash".to_string());

        let first = service
            .issue(
                &mut credentials,
                &principal,
                &DeviceInfo {
                    device_fingerprint: "device-1".to_string(),
                },
            )
            .unwrap();

        let second = service.refresh(&mut credentials, &first.refresh_token).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let err = service.refresh(&mut credentials, &first.refresh_token).unwrap_err();
        assert!(matches!(err, CoreError::AuthInvalid(ref s) if s == "revoked"));
    }

    #[test]
    fn excess_sessions_beyond_cap_are_revoked() {
        let mut config = CoreConfig::default();
        config.max_sessions_per_user = 2;
        let service = TokenService::new(b"test-secret".to_vec(), &config);
        let mut credentials = CredentialStore::new();
        let principal = sample_principal();
        credentials.register_password_principal(principal.clone(), "hash".to_string());

        let mut pairs = Vec::new();
        for i in 0..3 {
            pairs.push(
                service
                    .issue(
                        &mut credentials,
                        &principal,
                        &DeviceInfo {
                            device_fingerprint: format!("device-{i}"),
                        },
                    )
                    .unwrap(),
            );
        }

        assert_eq!(credentials.active_sessions_for_user("u1").len(), 2);
        assert!(service.refresh(&mut credentials, &pairs[0].refresh_token).is_err());
    }
}
