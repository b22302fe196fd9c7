use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::PublicUser;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Argon2 hash; null for OAuth-only accounts, never exposed in JSON.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub is_admin: bool,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            is_admin: self.is_admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projections_never_carry_the_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "owner@example.com".into(),
            password_hash: Some("argon2id$super-secret".into()),
            name: Some("Owner".into()),
            image: None,
            bio: None,
            location: None,
            is_admin: true,
            last_login: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let public = serde_json::to_string(&user.public()).expect("serialize projection");
        assert!(!public.contains("password_hash"));
        assert!(!public.contains("super-secret"));
        // The raw row skips the column too when serialized.
        let row = serde_json::to_string(&user).expect("serialize row");
        assert!(!row.contains("super-secret"));
    }
}

/// Provider link record, unique per (provider, provider_account_id).
#[derive(Debug, Clone, FromRow)]
pub struct OAuthAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}
