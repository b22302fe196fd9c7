use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::warn;

use crate::auth::session::{SessionKeys, SessionView};

/// Outcome of the admin gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Authorized,
    Denied,
}

/// Admin gate: a present session with the admin flag is authorized,
/// everything else is denied. An absent session can never authorize.
pub fn authorize(view: Option<&SessionView>) -> Access {
    match view {
        Some(v) if v.is_admin => Access::Authorized,
        _ => Access::Denied,
    }
}

/// The one body every denial gets; it leaks neither whether a session was
/// presented nor whether the resource exists.
const DENIED: &str = "not authorized";

fn denied() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, DENIED.to_string())
}

fn bearer_view<S>(parts: &Parts, state: &S) -> Option<SessionView>
where
    SessionKeys: FromRef<S>,
{
    let keys = SessionKeys::from_ref(state);
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;
    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))?;
    match keys.verify(token) {
        Ok(claims) => Some(claims.view()),
        Err(_) => {
            warn!("invalid or expired session token");
            None
        }
    }
}

/// Extracts a valid session, admin or not.
pub struct AuthUser(pub SessionView);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let view = bearer_view(parts, state).ok_or((
            StatusCode::UNAUTHORIZED,
            "invalid or missing session".to_string(),
        ))?;
        Ok(AuthUser(view))
    }
}

/// Extracts a session that passes the admin gate. Every state-mutating
/// admin handler takes this; the client-rendered gate is advisory only.
pub struct AdminUser(pub SessionView);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let view = bearer_view(parts, state);
        match authorize(view.as_ref()) {
            Access::Authorized => Ok(AdminUser(view.ok_or_else(denied)?)),
            Access::Denied => Err(denied()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn view(is_admin: bool) -> SessionView {
        SessionView {
            user_id: Uuid::new_v4(),
            is_admin,
            email: "owner@example.com".into(),
            name: None,
            image: None,
            error: None,
        }
    }

    #[test]
    fn admin_session_is_authorized() {
        assert_eq!(authorize(Some(&view(true))), Access::Authorized);
    }

    #[test]
    fn non_admin_session_is_denied() {
        assert_eq!(authorize(Some(&view(false))), Access::Denied);
    }

    #[test]
    fn absent_session_is_denied() {
        assert_eq!(authorize(None), Access::Denied);
    }
}
