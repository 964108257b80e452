//! The session gate.
//!
//! Every request to a gated route presents the `session_id` cookie. The
//! gate sweeps expired rows, resolves the token, extends the session's
//! expiry (sliding TTL), and attaches [`AuthedUser`] for the handler. A
//! missing, unknown, or expired token is a plain 401 — the gate never
//! reveals which.
//!
//! Also home to the account handlers that mint and destroy sessions:
//! register, login, logout.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tangle_core::UserId;
use tangle_store::repositories::user::NewUser;
use tangle_store::repositories::{SessionRepo, UserRepo};
use tangle_store::StoreError;

use crate::server::AppState;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session_id";

/// The authenticated user, attached to gated requests by the middleware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthedUser(pub UserId);

/// Middleware guarding gated routes.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        counter!("gate_rejections_total").increment(1);
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let token = cookie.value().to_owned();

    let user_id = {
        let conn = match state.store.conn() {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "gate could not reach the store");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        // Opportunistic sweep so a stale token can't ride a backlog.
        if let Err(err) = SessionRepo::sweep_expired(&conn) {
            warn!(error = %err, "pre-request session sweep failed");
        }

        match SessionRepo::validate(&conn, &token) {
            Ok(session) => {
                if let Err(err) = SessionRepo::extend(&conn, &token) {
                    warn!(error = %err, "failed to extend session");
                }
                session.user_id
            }
            Err(StoreError::SessionNotFound) => {
                counter!("gate_rejections_total").increment(1);
                debug!("rejected unknown or expired session token");
                return StatusCode::UNAUTHORIZED.into_response();
            }
            Err(err) => {
                warn!(error = %err, "session validation failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    };

    let _ = request.extensions_mut().insert(AuthedUser(user_id));
    next.run(request).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Account handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /register`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Login email.
    pub email: String,
    /// Plaintext password, hashed before it reaches the store.
    pub password: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Nickname.
    #[serde(default)]
    pub nickname: String,
    /// Free-form bio.
    #[serde(default)]
    pub about_me: String,
    /// Avatar reference.
    #[serde(default)]
    pub profile_picture: Option<String>,
    /// Whether the profile is public (default true).
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

/// Body of `POST /login`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Login email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

/// Body returned by `register` and `login`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// The logged-in user.
    pub user_id: UserId,
}

/// `POST /register` — create an account and log it in.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), StatusCode> {
    let conn = state.store.conn().map_err(internal)?;

    if UserRepo::get_by_email(&conn, &body.email)
        .map_err(internal)?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }

    let password_hash = hash_password(&body.password).map_err(internal)?;
    let user = UserRepo::create(
        &conn,
        &NewUser {
            email: &body.email,
            password_hash: &password_hash,
            first_name: &body.first_name,
            last_name: &body.last_name,
            nickname: &body.nickname,
            about_me: &body.about_me,
            profile_picture: body.profile_picture.as_deref(),
            is_public: body.is_public,
        },
    )
    .map_err(internal)?;

    let session = SessionRepo::create(&conn, user.id).map_err(internal)?;
    counter!("accounts_registered_total").increment(1);
    Ok((
        jar.add(session_cookie(session.token)),
        Json(SessionResponse { user_id: user.id }),
    ))
}

/// `POST /login` — verify credentials and mint a session.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), StatusCode> {
    let conn = state.store.conn().map_err(internal)?;

    let user = UserRepo::get_by_email(&conn, &body.email)
        .map_err(internal)?
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let stored_hash = UserRepo::password_hash(&conn, &body.email)
        .map_err(internal)?
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if !verify_password(&body.password, &stored_hash) {
        counter!("logins_rejected_total").increment(1);
        return Err(StatusCode::UNAUTHORIZED);
    }

    let session = SessionRepo::create(&conn, user.id).map_err(internal)?;
    debug!(user_id = user.id, "login succeeded");
    Ok((
        jar.add(session_cookie(session.token)),
        Json(SessionResponse { user_id: user.id }),
    ))
}

/// `POST /logout` — destroy the presented session, if any.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), StatusCode> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let conn = state.store.conn().map_err(internal)?;
        SessionRepo::delete(&conn, cookie.value()).map_err(internal)?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn internal<E: std::fmt::Display>(err: E) -> StatusCode {
    warn!(error = %err, "account handler failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

// ─────────────────────────────────────────────────────────────────────────────
// Password hashing
// ─────────────────────────────────────────────────────────────────────────────

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}
