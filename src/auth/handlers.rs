use axum::{
    extract::{FromRef, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, OAuthCallbackRequest, RefreshRequest, RefreshResponse,
            RegisterRequest,
        },
        error::auth_error_response,
        extractors::AuthUser,
        oauth::link_or_create_user,
        password::hash_password,
        repo_types::User,
        services::{is_valid_email, verify_credentials},
        session::{self, SessionKeys, SessionView},
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/oauth/callback", post(oauth_callback))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

async fn note_login(state: &AppState, user_id: uuid::Uuid, headers: &HeaderMap) {
    let ip = client_ip(headers);
    let ua = user_agent(headers);
    if let Err(e) = User::record_login(&state.db, user_id, ip.as_deref(), ua.as_deref()).await {
        warn!(error = %e, user_id = %user_id, "failed to record login event");
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if payload.password.len() < 8 {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    if let Ok(Some(_)) = User::find_by_email(&state.db, &payload.email).await {
        warn!(email = %payload.email, "email already registered");
        return Err((StatusCode::CONFLICT, "Email already registered".into()));
    }

    let hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let user = match User::create(&state.db, &payload.email, &hash, payload.name.as_deref()).await
    {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let keys = SessionKeys::from_ref(&state);
    let public = user.public();
    let token = keys
        .issue_for_credentials(&public)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Json(AuthResponse {
        token,
        user: public,
    }))
}

#[instrument(skip(state, headers, payload))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let user = match verify_credentials(&state.db, &payload.email, &payload.password).await {
        Ok(u) => u,
        Err(e) => return Err(auth_error_response(e)),
    };

    note_login(&state, user.id, &headers).await;

    let keys = SessionKeys::from_ref(&state);
    let token = keys
        .issue_for_credentials(&user)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse { token, user }))
}

#[instrument(skip(state, headers, payload))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OAuthCallbackRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let tokens = state
        .provider
        .exchange_code(&payload.code)
        .await
        .map_err(auth_error_response)?;
    let profile = state
        .provider
        .fetch_profile(&tokens.access_token)
        .await
        .map_err(auth_error_response)?;

    let user = link_or_create_user(
        &state.db,
        &state.config.oauth.provider,
        &profile,
        &tokens,
    )
    .await
    .map_err(auth_error_response)?;

    note_login(&state, user.id, &headers).await;

    let keys = SessionKeys::from_ref(&state);
    let public = user.public();
    let token = keys
        .issue_for_oauth(&public, &tokens)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(user_id = %user.id, provider = %state.config.oauth.provider, "oauth sign-in");
    Ok(Json(AuthResponse {
        token,
        user: public,
    }))
}

/// Validate the presented session, refresh the provider tokens when they
/// have lapsed, and hand back either the same token or a re-signed one. A
/// failed provider refresh comes back as a usable, degraded session.
#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, (StatusCode, String)> {
    let keys = SessionKeys::from_ref(&state);
    let claims = keys
        .verify(&payload.token)
        .map_err(|_| (StatusCode::UNAUTHORIZED, "invalid or expired session".into()))?;

    let now = OffsetDateTime::now_utc();
    let before = claims.clone();
    let claims = session::renew(claims, now, state.provider.as_ref()).await;

    let changed = claims.atk != before.atk
        || claims.rtk != before.rtk
        || claims.ate != before.ate
        || claims.err != before.err;
    let session = claims.view();
    let token = if changed || keys.needs_resign(&claims, now) {
        keys.resign(claims, now)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    } else {
        payload.token
    };

    Ok(Json(RefreshResponse { token, session }))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(view): AuthUser) -> Json<SessionView> {
    Json(view)
}
