use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::session::SessionView;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

/// Request body for credential sign-in.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackRequest {
    pub code: String,
}

/// Request body for session refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

/// Response returned after register, login or the OAuth callback.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Response returned after a session refresh.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub token: String,
    pub session: SessionView,
}

/// Public projection of a user. Deliberately has no password-hash field.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub is_admin: bool,
}
