use std::time::Duration;

use anyhow::Context;
use axum::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::repo_types::{OAuthAccount, User};
use crate::config::OAuthConfig;

/// Tokens handed back by the identity provider.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

/// Profile claims from the provider's userinfo endpoint.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub provider_account_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Outbound boundary to the third-party identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens, AuthError>;
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError>;
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokens, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    sub: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

fn tokens_from_response(resp: TokenResponse, now: OffsetDateTime) -> ProviderTokens {
    ProviderTokens {
        access_token: resp.access_token,
        refresh_token: resp.refresh_token,
        expires_at: resp
            .expires_in
            .map(|secs| now + time::Duration::seconds(secs)),
    }
}

/// A provider may omit a new refresh token from its response; in that case
/// the prior one stays valid and must be retained.
pub fn merge_refreshed(prior_refresh: Option<&str>, fresh: ProviderTokens) -> ProviderTokens {
    ProviderTokens {
        refresh_token: fresh
            .refresh_token
            .or_else(|| prior_refresh.map(str::to_owned)),
        ..fresh
    }
}

pub struct HttpProvider {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl HttpProvider {
    pub fn new(config: OAuthConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build oauth http client")?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl IdentityProvider for HttpProvider {
    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens, AuthError> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "code exchange request failed");
                AuthError::ProviderError
            })?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "code exchange rejected");
            return Err(AuthError::ProviderError);
        }
        let body: TokenResponse = resp.json().await.map_err(|e| {
            warn!(error = %e, "code exchange response malformed");
            AuthError::ProviderError
        })?;
        Ok(tokens_from_response(body, OffsetDateTime::now_utc()))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let resp = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "userinfo request failed");
                AuthError::ProviderError
            })?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "userinfo rejected");
            return Err(AuthError::ProviderError);
        }
        let body: UserInfoResponse = resp.json().await.map_err(|e| {
            warn!(error = %e, "userinfo response malformed");
            AuthError::ProviderError
        })?;
        Ok(ProviderProfile {
            provider_account_id: body.sub,
            email: body.email,
            name: body.name,
            image: body.picture,
        })
    }

    /// A transport error here includes hitting the client timeout; both are
    /// reported as `RefreshFailed` and degrade the session instead of
    /// failing the request that triggered the refresh.
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokens, AuthError> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "refresh request failed");
                AuthError::RefreshFailed
            })?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "refresh rejected");
            return Err(AuthError::RefreshFailed);
        }
        let body: TokenResponse = resp.json().await.map_err(|e| {
            warn!(error = %e, "refresh response malformed");
            AuthError::RefreshFailed
        })?;
        Ok(tokens_from_response(body, OffsetDateTime::now_utc()))
    }
}

/// Explicit refresh operation: fails with `NoRefreshToken` when there is
/// nothing to exchange, `RefreshFailed` when the provider rejects it. The
/// session issuer attaches these to the session instead of raising them.
pub async fn refresh_provider_tokens(
    provider: &dyn IdentityProvider,
    prior_refresh: Option<&str>,
) -> Result<ProviderTokens, AuthError> {
    let token = prior_refresh.ok_or(AuthError::NoRefreshToken)?;
    let fresh = provider.refresh(token).await?;
    Ok(merge_refreshed(Some(token), fresh))
}

/// What the initial exchange should do with the provider identity, decided
/// from the existing link row and the user matched by the claimed email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// A link for this (provider, provider_account_id) already exists.
    UseExisting { user_id: Uuid },
    /// No link yet; attach the provider account to this local user.
    LinkToUser { user_id: Uuid },
    /// No link and no local user; create one from the profile claims.
    CreateUser,
}

pub fn plan_link(
    existing_link_user: Option<Uuid>,
    email_match: Option<Uuid>,
) -> Result<LinkAction, AuthError> {
    match (existing_link_user, email_match) {
        (Some(linked), Some(matched)) if linked != matched => {
            Err(AuthError::ProviderLinkConflict)
        }
        (Some(linked), _) => Ok(LinkAction::UseExisting { user_id: linked }),
        (None, Some(matched)) => Ok(LinkAction::LinkToUser { user_id: matched }),
        (None, None) => Ok(LinkAction::CreateUser),
    }
}

/// Initial-exchange path: resolve the provider identity to a local user,
/// creating or linking as needed, and store the provider tokens on the link
/// row. Upserting on (provider, provider_account_id) keeps the path
/// idempotent across repeated callbacks.
pub async fn link_or_create_user(
    db: &PgPool,
    provider_name: &str,
    profile: &ProviderProfile,
    tokens: &ProviderTokens,
) -> Result<User, AuthError> {
    let link = OAuthAccount::find_by_provider_account(
        db,
        provider_name,
        &profile.provider_account_id,
    )
    .await
    .map_err(AuthError::Other)?;
    let by_email = User::find_by_email(db, &profile.email)
        .await
        .map_err(AuthError::Other)?;

    let action = plan_link(link.map(|l| l.user_id), by_email.as_ref().map(|u| u.id))?;
    let user = match action {
        LinkAction::UseExisting { user_id } | LinkAction::LinkToUser { user_id } => {
            User::find_by_id(db, user_id)
                .await
                .map_err(AuthError::Other)?
                .ok_or_else(|| AuthError::Other(anyhow::anyhow!("linked user row missing")))?
        }
        LinkAction::CreateUser => {
            let user = User::create_from_profile(db, profile)
                .await
                .map_err(AuthError::Other)?;
            info!(user_id = %user.id, email = %user.email, "user created from provider profile");
            user
        }
    };

    OAuthAccount::upsert_link(
        db,
        user.id,
        provider_name,
        &profile.provider_account_id,
        tokens,
    )
    .await
    .map_err(AuthError::Other)?;

    Ok(user)
}
