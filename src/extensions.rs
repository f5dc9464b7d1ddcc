use std::str::FromStr;
use std::time::Duration;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::response::Redirect;
use axum::Extension;
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use eyre::{ensure, Result};
use log::{debug, error};
use tap::TapFallible;
use uuid::Uuid;

use crate::domain::flash::Flash;
use crate::domain::user::User;
use crate::error::Error;
use crate::routes::Api;

pub const SESSION_COOKIE: &str = "session";
pub const FLASH_COOKIE: &str = "flash";
pub const CSRF_COOKIE: &str = "csrf";
pub const LOGIN_PATH: &str = "/login";

/// The logged-in caller. Rejects with a redirect to the login page when the
/// session cookie is missing, unreadable or no longer bound to a user.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub token: Uuid,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = Redirect;

    async fn from_request_parts(req: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::<Key>::from_request_parts(req, state)
            .await
            .map_err(|_| Redirect::to(LOGIN_PATH))?;
        let token = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| Uuid::from_str(cookie.value()).ok())
            .ok_or_else(|| {
                debug!("No valid session cookie on {}", req.uri.path());
                Redirect::to(LOGIN_PATH)
            })?;
        let Extension(api) = Extension::<Api>::from_request_parts(req, state)
            .await
            .tap_err(|e| error!("Failed to extract API: {}", e))
            .map_err(|_| Redirect::to(LOGIN_PATH))?;

        match api.get_user_by_session_token(token).await {
            Ok(Some(user)) => Ok(AuthenticatedUser { user, token }),
            Ok(None) => {
                debug!("Session token no longer valid");
                Err(Redirect::to(LOGIN_PATH))
            }
            Err(e) => {
                error!("Failed to get user from session: {:?}", e);
                Err(Redirect::to(LOGIN_PATH))
            }
        }
    }
}

fn cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

/// The cookie expires together with the server-side session.
pub fn start_session(jar: PrivateCookieJar, token: Uuid, ttl: Duration) -> PrivateCookieJar {
    let mut session = cookie(SESSION_COOKIE, token.to_string());
    session.set_max_age(time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX));
    jar.add(session)
}

pub fn end_session(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(removal(SESSION_COOKIE))
}

pub fn push_flash(jar: PrivateCookieJar, flash: Flash) -> PrivateCookieJar {
    match serde_json::to_string(&flash) {
        Ok(value) => jar.add(cookie(FLASH_COOKIE, value)),
        Err(e) => {
            error!("Failed to serialize flash message: {}", e);
            jar
        }
    }
}

/// Reads the pending flash message, if any, and clears it from the client.
pub fn take_flash(jar: PrivateCookieJar) -> (PrivateCookieJar, Option<Flash>) {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return (jar, None);
    };
    let flash = serde_json::from_str(cookie.value())
        .tap_err(|e| debug!("Discarding unreadable flash cookie: {}", e))
        .ok();
    (jar.remove(removal(FLASH_COOKIE)), flash)
}

/// Returns the form token bound to this client, issuing one if it has none yet.
pub fn csrf_token(jar: PrivateCookieJar) -> (PrivateCookieJar, String) {
    if let Some(cookie) = jar.get(CSRF_COOKIE) {
        return (jar, cookie.value().to_string());
    }
    let token = Uuid::new_v4().simple().to_string();
    (jar.add(cookie(CSRF_COOKIE, token.clone())), token)
}

pub fn verify_csrf(jar: &PrivateCookieJar, submitted: &str) -> Result<()> {
    let expected = jar.get(CSRF_COOKIE);
    ensure!(
        expected.is_some_and(|cookie| !submitted.is_empty() && cookie.value() == submitted),
        Error::InvalidCsrfToken
    );
    Ok(())
}
