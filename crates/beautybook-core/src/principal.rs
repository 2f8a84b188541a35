//! C3 Principal Resolver: middleware applied to every protected route.

use crate::credentials::CredentialStore;
use crate::error::CoreError;
use crate::token::TokenService;
use crate::types::{Principal, PrincipalStatus};

/// Parses the bearer header, verifies signature/expiry, re-hydrates the
/// live principal, and fails with `role_changed` if the persisted role
/// drifted from the token's claim.
pub fn resolve_principal(
    token_service: &TokenService,
    credentials: &CredentialStore,
    authorization_header: Option<&str>,
) -> Result<Principal, CoreError> {
    let token = authorization_header
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(CoreError::AuthRequired)?;

    let claims = token_service.verify_access_token(token)?;

    let principal = credentials
        .find_by_id(&claims.sub)
        .ok_or_else(|| CoreError::AuthInvalid("user_not_found".to_string()))?;

    if principal.role != claims.role {
        return Err(CoreError::AuthInvalid("role_changed".to_string()));
    }

    check_principal_active(&principal)?;

    Ok(principal)
}

/// Distinguishes the suspended case, which maps to 403 rather than 401 at
/// the HTTP edge.
pub fn check_principal_active(principal: &Principal) -> Result<(), CoreError> {
    match principal.status {
        PrincipalStatus::Active => Ok(()),
        PrincipalStatus::Suspended => Err(CoreError::Validation("suspended".to_string())),
        PrincipalStatus::Deleted => Err(CoreError::AuthInvalid("user_not_found".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::types::{DeviceInfo, Role};

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
    fn resolves_principal_from_valid_token() {
        let config = CoreConfig::default();
        let service = TokenService::new(b"secret".to_vec(), &config);
        let mut credentials = CredentialStore::new();
        let principal = sample_principal();
        credentials.register_password_principal(principal.clone(), "hash".to_string());
        let pair = service
            .issue(
                &mut credentials,
                &principal,
                &DeviceInfo {
                    device_fingerprint: "d1".to_string(),
                },
            )
            .unwrap();

        let header = format!("Bearer {}", pair.access_token);
        let resolved = resolve_principal(&service, &credentials, Some(&header)).unwrap();
        assert_eq!(resolved.id, "u1");
    }

    #[test]
    fn missing_token_is_auth_required() {
        let config = CoreConfig::default();
        let service = TokenService::new(b"secret".to_vec(), &config);
        let credentials = CredentialStore::new();
        let err = resolve_principal(&service, &credentials, None).unwrap_err();
        assert!(matches!(err, CoreError::AuthRequired));
    }

    #[test]
    fn role_drift_is_rejected() {
        let config = CoreConfig::default();
        let service = TokenService::new(b"secret".to_vec(), &config);
        let mut credentials = CredentialStore::new();
        let principal = sample_principal();
        credentials.register_password_principal(principal.clone(), "hash".to_string());
        let pair = service
            .issue(
                &mut credentials,
                &principal,
                &DeviceInfo {
                    device_fingerprint: "d1".to_string(),
                },
            )
            .unwrap();

        let mut promoted = principal.clone();
        promoted.role = Role::Admin;
        credentials.register_password_principal(promoted, "hash".to_string());

        let header = format!("Bearer {}", pair.access_token);
        let err = resolve_principal(&service, &credentials, Some(&header)).unwrap_err();
        assert!(matches!(err, CoreError::AuthInvalid(ref s) if s == "role_changed"));
    }
}
