use axum::http::StatusCode;
use thiserror::Error;
use tracing::error;

/// Failures produced by the sign-in and session components.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email/password, unknown email, or an OAuth-only account.
    /// Callers must surface all three identically.
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account already in use with a different provider")]
    ProviderLinkConflict,
    #[error("identity provider rejected the sign-in")]
    ProviderError,
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error("provider rejected the token exchange")]
    RefreshFailed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub(crate) fn auth_error_response(e: AuthError) -> (StatusCode, String) {
    match e {
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, e.to_string()),
        AuthError::ProviderLinkConflict => (StatusCode::CONFLICT, e.to_string()),
        AuthError::ProviderError => (StatusCode::BAD_GATEWAY, e.to_string()),
        AuthError::NoRefreshToken | AuthError::RefreshFailed => {
            (StatusCode::UNAUTHORIZED, e.to_string())
        }
        AuthError::Other(err) => {
            error!(error = %err, "auth internal error");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
        }
    }
}
