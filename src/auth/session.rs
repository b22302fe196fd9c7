use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::dto::PublicUser;
use crate::auth::oauth::{merge_refreshed, IdentityProvider, ProviderTokens};
use crate::config::JwtConfig;
use crate::state::AppState;

/// Error tag attached to a degraded session. Provider-backed actions fail
/// until the user signs in again; identity claims stay usable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionErrorTag {
    RefreshFailed,
    NoRefreshToken,
}

/// Signed session payload. Never persisted server-side; the token itself is
/// the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub adm: bool,
    pub email: String,
    pub name: Option<String>,
    pub img: Option<String>,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    /// OAuth access token, or an opaque per-session id for credential
    /// sign-ins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtk: Option<String>,
    /// Provider access-token expiry, unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ate: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<SessionErrorTag>,
}

/// Redacted projection handed to callers; raw provider tokens stay inside
/// this module.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub user_id: Uuid,
    pub is_admin: bool,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub error: Option<SessionErrorTag>,
}

impl SessionClaims {
    pub fn view(&self) -> SessionView {
        SessionView {
            user_id: self.sub,
            is_admin: self.adm,
            email: self.email.clone(),
            name: self.name.clone(),
            image: self.img.clone(),
            error: self.err,
        }
    }

    fn provider_token_expired(&self, now: OffsetDateTime) -> bool {
        match self.ate {
            Some(ate) => ate <= now.unix_timestamp(),
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
    pub renew_after_fraction: f64,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            renew_after_fraction,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_minutes as u64) * 60),
            renew_after_fraction,
        }
    }
}

impl SessionKeys {
    fn build_claims(
        &self,
        user: &PublicUser,
        now: OffsetDateTime,
        tokens: Option<&ProviderTokens>,
    ) -> SessionClaims {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        SessionClaims {
            sub: user.id,
            adm: user.is_admin,
            email: user.email.clone(),
            name: user.name.clone(),
            img: user.image.clone(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            atk: Some(match tokens {
                Some(t) => t.access_token.clone(),
                None => Uuid::new_v4().to_string(),
            }),
            rtk: tokens.and_then(|t| t.refresh_token.clone()),
            ate: tokens.and_then(|t| t.expires_at.map(|e| e.unix_timestamp())),
            err: None,
        }
    }

    fn sign(&self, claims: &SessionClaims) -> anyhow::Result<String> {
        let token = encode(&Header::default(), claims, &self.encoding)?;
        debug!(user_id = %claims.sub, "session signed");
        Ok(token)
    }

    /// Credential sign-in: an opaque per-session id stands in for the
    /// access token, and there is nothing to refresh.
    pub fn issue_for_credentials(&self, user: &PublicUser) -> anyhow::Result<String> {
        self.sign(&self.build_claims(user, OffsetDateTime::now_utc(), None))
    }

    /// OAuth sign-in: embed the provider token bundle.
    pub fn issue_for_oauth(
        &self,
        user: &PublicUser,
        tokens: &ProviderTokens,
    ) -> anyhow::Result<String> {
        self.sign(&self.build_claims(user, OffsetDateTime::now_utc(), Some(tokens)))
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<SessionClaims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "session verified");
        Ok(data.claims)
    }

    /// Sliding renewal: re-sign once the token is past the configured
    /// fraction of its lifetime.
    pub fn needs_resign(&self, claims: &SessionClaims, now: OffsetDateTime) -> bool {
        let age = now.unix_timestamp() - claims.iat as i64;
        age >= (self.ttl.as_secs() as f64 * self.renew_after_fraction) as i64
    }

    /// Sign the claims again with a fresh validity window.
    pub fn resign(&self, mut claims: SessionClaims, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        claims.iat = now.unix_timestamp() as usize;
        claims.exp = exp.unix_timestamp() as usize;
        self.sign(&claims)
    }
}

/// Renewal decision for the provider token bundle. Pure apart from the
/// injected provider call:
/// - expiry absent or in the future: pass through unchanged;
/// - expired with a refresh token: exchange it, replacing the bundle (the
///   prior refresh token is retained when the provider omits a new one), or
///   tag the session `RefreshFailed`;
/// - expired without a refresh token: pass through unchanged, degraded.
pub async fn renew(
    mut claims: SessionClaims,
    now: OffsetDateTime,
    provider: &dyn IdentityProvider,
) -> SessionClaims {
    if !claims.provider_token_expired(now) {
        return claims;
    }
    let Some(prior_refresh) = claims.rtk.clone() else {
        return claims;
    };
    match provider.refresh(&prior_refresh).await {
        Ok(fresh) => {
            let merged = merge_refreshed(Some(&prior_refresh), fresh);
            claims.atk = Some(merged.access_token);
            claims.rtk = merged.refresh_token;
            claims.ate = merged.expires_at.map(|e| e.unix_timestamp());
            claims.err = None;
        }
        Err(e) => {
            warn!(user_id = %claims.sub, error = %e, "provider refresh failed; session degraded");
            claims.err = Some(SessionErrorTag::RefreshFailed);
        }
    }
    claims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::AuthError;
    use crate::auth::oauth::ProviderProfile;
    use crate::state::AppState;
    use axum::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_keys() -> SessionKeys {
        let state = AppState::fake();
        SessionKeys::from_ref(&state)
    }

    fn user() -> PublicUser {
        PublicUser {
            id: Uuid::new_v4(),
            email: "owner@example.com".into(),
            name: Some("Owner".into()),
            image: None,
            is_admin: true,
        }
    }

    fn oauth_claims(
        keys: &SessionKeys,
        expires_at: OffsetDateTime,
        refresh: Option<&str>,
    ) -> SessionClaims {
        let tokens = ProviderTokens {
            access_token: "provider-access".into(),
            refresh_token: refresh.map(str::to_owned),
            expires_at: Some(expires_at),
        };
        keys.build_claims(&user(), OffsetDateTime::now_utc(), Some(&tokens))
    }

    /// Provider double that counts refresh calls and can be set to fail.
    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingProvider {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        async fn exchange_code(&self, _code: &str) -> Result<ProviderTokens, AuthError> {
            unreachable!("renewal never exchanges codes")
        }

        async fn fetch_profile(&self, _token: &str) -> Result<ProviderProfile, AuthError> {
            unreachable!("renewal never fetches profiles")
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<ProviderTokens, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AuthError::RefreshFailed);
            }
            Ok(ProviderTokens {
                access_token: "rotated-access".into(),
                refresh_token: None,
                expires_at: Some(OffsetDateTime::now_utc() + TimeDuration::hours(1)),
            })
        }
    }

    #[tokio::test]
    async fn sign_and_verify_roundtrip() {
        let keys = make_keys();
        let u = user();
        let token = keys.issue_for_credentials(&u).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, u.id);
        assert!(claims.adm);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        // Credential sessions carry an opaque access token and no refresh token.
        assert!(claims.atk.is_some());
        assert!(claims.rtk.is_none());
        assert!(claims.ate.is_none());
    }

    #[tokio::test]
    async fn verify_rejects_other_audience() {
        let keys = make_keys();
        let mut other = make_keys();
        other.audience = "other-aud".into();
        let token = keys.issue_for_credentials(&user()).expect("sign");
        assert!(other.verify(&token).is_err());
    }

    #[tokio::test]
    async fn renew_passes_through_while_provider_token_is_fresh() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();
        let claims = oauth_claims(&keys, now + TimeDuration::hours(1), Some("refresh-1"));
        let provider = CountingProvider::new(false);
        let renewed = renew(claims.clone(), now, &provider).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(renewed.atk, claims.atk);
        assert_eq!(renewed.ate, claims.ate);
        assert!(renewed.err.is_none());
    }

    #[tokio::test]
    async fn renew_refreshes_expired_provider_token() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();
        let claims = oauth_claims(&keys, now - TimeDuration::minutes(5), Some("refresh-1"));
        let provider = CountingProvider::new(false);
        let renewed = renew(claims, now, &provider).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(renewed.atk.as_deref(), Some("rotated-access"));
        assert!(renewed.ate.expect("expiry") > now.unix_timestamp());
        // Provider omitted a rotated refresh token: the prior one is kept.
        assert_eq!(renewed.rtk.as_deref(), Some("refresh-1"));
        assert!(renewed.err.is_none());
    }

    #[tokio::test]
    async fn renew_without_refresh_token_is_unchanged_and_untagged() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();
        let claims = oauth_claims(&keys, now - TimeDuration::minutes(5), None);
        let provider = CountingProvider::new(false);
        let renewed = renew(claims.clone(), now, &provider).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(renewed.atk, claims.atk);
        assert_eq!(renewed.ate, claims.ate);
        assert!(renewed.err.is_none());
    }

    #[tokio::test]
    async fn renew_tags_session_when_provider_rejects() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();
        let claims = oauth_claims(&keys, now - TimeDuration::minutes(5), Some("refresh-1"));
        let provider = CountingProvider::new(true);
        let renewed = renew(claims, now, &provider).await;
        assert_eq!(renewed.err, Some(SessionErrorTag::RefreshFailed));
        // Identity and the refresh token survive for a later retry.
        assert_eq!(renewed.rtk.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn resign_threshold_follows_token_age() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();
        let mut claims = keys.build_claims(&user(), now, None);
        assert!(!keys.needs_resign(&claims, now));
        // Past half of the 5-minute fake lifetime.
        claims.iat = (now - TimeDuration::minutes(3)).unix_timestamp() as usize;
        assert!(keys.needs_resign(&claims, now));
    }

    #[tokio::test]
    async fn view_redacts_provider_tokens() {
        let keys = make_keys();
        let claims = oauth_claims(
            &keys,
            OffsetDateTime::now_utc() + TimeDuration::hours(1),
            Some("refresh-1"),
        );
        let view = claims.view();
        let json = serde_json::to_string(&view).expect("serialize view");
        assert!(!json.contains("provider-access"));
        assert!(!json.contains("refresh-1"));
        assert_eq!(view.user_id, claims.sub);
    }
}
