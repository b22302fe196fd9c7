use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::warn;

use crate::auth::dto::PublicUser;
use crate::auth::error::AuthError;
use crate::auth::password::verify_password;
use crate::auth::repo_types::User;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Credential verification. Unknown email, an account with no password hash
/// (OAuth-only) and a wrong password all collapse into the same
/// `InvalidCredentials` so the response can't be used to probe for
/// registered emails. Returns the public projection only; recording the
/// login event is the caller's job.
pub async fn verify_credentials(
    db: &PgPool,
    email: &str,
    password: &str,
) -> Result<PublicUser, AuthError> {
    let user = User::find_by_email(db, email)
        .await
        .map_err(AuthError::Other)?;
    let Some(user) = user else {
        warn!(%email, "credential sign-in for unknown email");
        return Err(AuthError::InvalidCredentials);
    };
    let Some(hash) = user.password_hash.as_deref() else {
        warn!(user_id = %user.id, "credential sign-in against oauth-only account");
        return Err(AuthError::InvalidCredentials);
    };
    let ok = verify_password(password, hash).map_err(AuthError::Other)?;
    if !ok {
        warn!(user_id = %user.id, "credential sign-in with wrong password");
        return Err(AuthError::InvalidCredentials);
    }
    Ok(user.public())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_regex_accepts_plain_addresses() {
        assert!(is_valid_email("owner@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.io"));
    }

    #[test]
    fn email_regex_rejects_garbage() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("missing@tld"));
    }
}
