//! Social-login port: exchanges an external provider token for a stable
//! `(provider, providerUserId)` identity. The four concrete providers
//! (Kakao/Apple/Google/Naver) are modeled only by contract here; real
//! exchange logic lives in the adapters crate.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProviderKind {
    Kakao,
    Apple,
    Google,
    Naver,
}

impl OAuthProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OAuthProviderKind::Kakao => "kakao",
            OAuthProviderKind::Apple => "apple",
            OAuthProviderKind::Google => "google",
            OAuthProviderKind::Naver => "naver",
        }
    }
}

/// What the exchange resolves to; the caller looks this up against
/// `CredentialStore::find_by_social_identity` and registers a new principal
/// on first sign-in.
#[derive(Debug, Clone)]
pub struct OAuthIdentity {
    pub provider_user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Port one adapter implements per provider.
pub trait OAuthProvider: Send + Sync {
    fn kind(&self) -> OAuthProviderKind;
    fn exchange(&self, provider_token: &str) -> Result<OAuthIdentity, crate::error::CoreError>;
}
