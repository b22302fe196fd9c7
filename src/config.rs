use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    /// Fraction of the lifetime after which a presented token is re-signed.
    pub renew_after_fraction: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_uri: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub oauth: OAuthConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "foliocms".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "foliocms-admin".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 7),
            renew_after_fraction: std::env::var("JWT_RENEW_AFTER_FRACTION")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.5),
        };
        let oauth = OAuthConfig {
            provider: std::env::var("OAUTH_PROVIDER").unwrap_or_else(|_| "google".into()),
            client_id: std::env::var("OAUTH_CLIENT_ID")?,
            client_secret: std::env::var("OAUTH_CLIENT_SECRET")?,
            token_url: std::env::var("OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".into()),
            userinfo_url: std::env::var("OAUTH_USERINFO_URL")
                .unwrap_or_else(|_| "https://openidconnect.googleapis.com/v1/userinfo".into()),
            redirect_uri: std::env::var("OAUTH_REDIRECT_URI")?,
            timeout_secs: std::env::var("OAUTH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10),
        };
        Ok(Self {
            database_url,
            jwt,
            oauth,
        })
    }
}
