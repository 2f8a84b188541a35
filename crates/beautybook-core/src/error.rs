use thiserror::Error;

/// Error kinds surfaced by the domain core. Each variant maps to exactly one
/// HTTP status and machine-readable code at the service edge.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("invalid credentials: {0}")]
    AuthInvalid(String),

    #[error("cross-shop access denied")]
    ForbiddenCrossShop,

    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: String },

    #[error("invalid state transition: {0}")]
    ConflictState(String),

    #[error("reservation slot conflict")]
    ConflictSlot,

    #[error("duplicate delivery of idempotent operation")]
    ConflictIdempotent,

    #[error("insufficient points balance")]
    InsufficientPoints,

    #[error("duplicate verified user: {0}")]
    DuplicateUser(String),

    #[error("upstream gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable code used in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::AuthRequired => "auth_required",
            CoreError::AuthInvalid(_) => "auth_invalid",
            CoreError::ForbiddenCrossShop => "forbidden_cross_shop",
            CoreError::NotFound { .. } => "not_found",
            CoreError::ConflictState(_) => "conflict_state",
            CoreError::ConflictSlot => "conflict_slot",
            CoreError::ConflictIdempotent => "conflict_idempotent",
            CoreError::InsufficientPoints => "insufficient_points",
            CoreError::DuplicateUser(_) => "duplicate_user",
            CoreError::GatewayUnavailable(_) => "gateway_unavailable",
            CoreError::RateLimited => "rate_limited",
            CoreError::Internal(_) => "internal",
        }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn invalid_transition(from: &str, to: &str) -> Self {
        Self::ConflictState(format!("cannot transition from '{from}' to '{to}'"))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization error: {err}"))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Internal(format!("storage error: {err}"))
    }
}
