use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use beautybook_core::{
    CoreError, DeviceInfo, OAuthProviderKind, Principal, PrincipalStatus, Role, TokenService,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::middleware::{authenticate, client_ip, enforce_rate_limit};
use crate::password::hash_password;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    email: String,
    password: String,
    device_fingerprint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrincipalSummary {
    id: String,
    email: String,
    role: Role,
    shop_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenPairResponse {
    access_token: String,
    refresh_token: String,
    refresh_expires_at: chrono::DateTime<chrono::Utc>,
    principal: PrincipalSummary,
}

fn token_service(state: &AppState) -> TokenService<'_> {
    TokenService::new(state.token_secret.as_ref().clone(), state.config.as_ref())
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers);
    enforce_rate_limit(&state, None, &ip, "auth").await?;

    let mut credentials = state.credentials.lock().await;
    let principal = credentials
        .find_by_email(&req.email)
        .ok_or_else(|| CoreError::AuthInvalid("invalid_credentials".to_string()))?;

    if !credentials.verify_password(&principal.id, &hash_password(&req.password)) {
        return Err(CoreError::AuthInvalid("invalid_credentials".to_string()).into());
    }
    beautybook_core::check_principal_active(&principal)?;

    let pair = token_service(&state).issue(
        &mut credentials,
        &principal,
        &DeviceInfo {
            device_fingerprint: req.device_fingerprint,
        },
    )?;

    Ok(ok(
        StatusCode::OK,
        TokenPairResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            refresh_expires_at: pair.refresh_expires_at,
            principal: PrincipalSummary {
                id: principal.id,
                email: principal.email,
                role: principal.role,
                shop_id: principal.shop_id,
            },
        },
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    refresh_token: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers);
    enforce_rate_limit(&state, None, &ip, "auth").await?;

    let mut credentials = state.credentials.lock().await;
    let pair = token_service(&state).refresh(&mut credentials, &req.refresh_token)?;

    Ok(ok(
        StatusCode::OK,
        serde_json::json!({
            "accessToken": pair.access_token,
            "refreshToken": pair.refresh_token,
            "refreshExpiresAt": pair.refresh_expires_at,
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    email: String,
    password: String,
    referred_by_code: Option<String>,
}

pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers);
    enforce_rate_limit(&state, None, &ip, "auth").await?;

    let mut credentials = state.credentials.lock().await;
    if credentials.find_by_email(&req.email).is_some() {
        return Err(CoreError::DuplicateUser(req.email).into());
    }

    let principal = Principal {
        id: Uuid::new_v4().to_string(),
        email: req.email,
        role: Role::Customer,
        shop_id: None,
        status: PrincipalStatus::Active,
    };
    credentials.register_password_principal(principal.clone(), hash_password(&req.password));
    drop(credentials);

    let mut referrals = state.referrals.lock().await;
    let profile = referrals.issue_code(&principal.id);
    if let Some(code) = req.referred_by_code {
        referrals.set_referred_by_code(&principal.id, &code)?;
    }

    Ok(ok(
        StatusCode::CREATED,
        serde_json::json!({
            "principal": PrincipalSummary {
                id: principal.id,
                email: principal.email,
                role: principal.role,
                shop_id: principal.shop_id,
            },
            "referralCode": profile.referral_code,
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLoginRequest {
    provider: String,
    provider_token: String,
    device_fingerprint: String,
}

fn parse_provider(raw: &str) -> Result<OAuthProviderKind, ApiError> {
    match raw {
        "kakao" => Ok(OAuthProviderKind::Kakao),
        "apple" => Ok(OAuthProviderKind::Apple),
        "google" => Ok(OAuthProviderKind::Google),
        "naver" => Ok(OAuthProviderKind::Naver),
        other => Err(CoreError::Validation(format!("unknown oauth provider: {other}")).into()),
    }
}

pub async fn social_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SocialLoginRequest>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers);
    enforce_rate_limit(&state, None, &ip, "auth").await?;

    let kind = parse_provider(&req.provider)?;
    let provider = state
        .oauth_providers
        .get(&kind)
        .ok_or_else(|| CoreError::Internal("oauth provider not configured".to_string()))?;
    let identity = provider.exchange(&req.provider_token)?;

    let mut credentials = state.credentials.lock().await;
    let principal = match credentials.find_by_social_identity(kind.as_str(), &identity.provider_user_id) {
        Some(existing) => existing,
        None => {
            let principal = Principal {
                id: Uuid::new_v4().to_string(),
                email: identity.email.unwrap_or_else(|| format!("{}@unknown.example", identity.provider_user_id)),
                role: Role::Customer,
                shop_id: None,
                status: PrincipalStatus::Active,
            };
            credentials.register_social_identity(kind.as_str(), &identity.provider_user_id, principal.clone());
            let mut referrals = state.referrals.lock().await;
            referrals.issue_code(&principal.id);
            principal
        }
    };
    beautybook_core::check_principal_active(&principal)?;

    let pair = token_service(&state).issue(
        &mut credentials,
        &principal,
        &DeviceInfo {
            device_fingerprint: req.device_fingerprint,
        },
    )?;

    Ok(ok(
        StatusCode::OK,
        TokenPairResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            refresh_expires_at: pair.refresh_expires_at,
            principal: PrincipalSummary {
                id: principal.id,
                email: principal.email,
                role: principal.role,
                shop_id: principal.shop_id,
            },
        },
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    refresh_token: Option<String>,
    device_id: Option<String>,
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LogoutRequest>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;

    if let Some(token) = req.refresh_token {
        let mut credentials = state.credentials.lock().await;
        let _ = credentials.revoke_refresh_token(&token);
    }
    if let Some(device_id) = req.device_id {
        let mut notifications = state.notifications.lock().await;
        notifications.deactivate_token(&principal.id, &device_id);
    }

    Ok(ok(StatusCode::OK, serde_json::json!({ "loggedOut": true })))
}
