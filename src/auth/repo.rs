use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::oauth::{ProviderProfile, ProviderTokens};
use crate::auth::repo_types::{OAuthAccount, User};

impl User {
    /// Find a user by exact email match.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, name, image, bio, location,
                   is_admin, last_login, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, name, image, bio, location,
                   is_admin, last_login, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a user from a registration form. Registration never grants
    /// the admin flag.
    pub async fn create(
        db: &PgPool,
        email: &str,
        password_hash: &str,
        name: Option<&str>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, name)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, name, image, bio, location,
                      is_admin, last_login, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Create a user from provider profile claims on first OAuth sign-in.
    /// No password hash, and provider claims never set the admin flag.
    pub async fn create_from_profile(
        db: &PgPool,
        profile: &ProviderProfile,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, name, image)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, name, image, bio, location,
                      is_admin, last_login, created_at
            "#,
        )
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.image)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Append a login event and stamp `last_login`. The history table is
    /// append-only.
    pub async fn record_login(
        db: &PgPool,
        user_id: Uuid,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO login_events (user_id, ip, user_agent)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(ip)
        .bind(user_agent)
        .execute(db)
        .await?;

        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }
}

impl OAuthAccount {
    pub async fn find_by_provider_account(
        db: &PgPool,
        provider: &str,
        provider_account_id: &str,
    ) -> anyhow::Result<Option<OAuthAccount>> {
        let link = sqlx::query_as::<_, OAuthAccount>(
            r#"
            SELECT id, user_id, provider, provider_account_id,
                   access_token, refresh_token, expires_at, created_at
            FROM oauth_accounts
            WHERE provider = $1 AND provider_account_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(db)
        .await?;
        Ok(link)
    }

    /// Insert or update the link row for (provider, provider_account_id).
    /// COALESCE keeps the stored refresh token when the provider omitted a
    /// new one from its response.
    pub async fn upsert_link(
        db: &PgPool,
        user_id: Uuid,
        provider: &str,
        provider_account_id: &str,
        tokens: &ProviderTokens,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_accounts
                (user_id, provider, provider_account_id, access_token, refresh_token, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider, provider_account_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, oauth_accounts.refresh_token),
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_account_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_at)
        .execute(db)
        .await?;
        Ok(())
    }
}
