//! Session plumbing for the server.
//!
//! Sessions are opaque bearer tokens minted by [`soko_engine::AuthApi::login`] and carried in
//! the httpOnly `session_token` cookie. The [session middleware](crate::middleware) resolves
//! the cookie to a [`SessionUser`] on every `/api` request and stashes it in the request
//! extensions; handlers pull it out again with the [`SessionClaims`] extractor.
//!
//! The readable `csrf_token` cookie is the other half of the double-submit CSRF check; see
//! [`crate::middleware::CsrfMiddlewareFactory`].

use std::future::{ready, Ready};

use actix_web::{cookie::{time, Cookie, SameSite}, dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::Duration;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use soko_engine::db_types::SessionUser;

use crate::errors::ServerError;

pub const SESSION_COOKIE: &str = "session_token";
pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Header carrying the single-use token minted by a `PayoutDestination` OTP.
pub const ACTION_TOKEN_HEADER: &str = "x-action-token";

/// The authenticated identity for the current request. Extracting this fails with a 401 when
/// the session middleware found no valid cookie.
#[derive(Debug, Clone)]
pub struct SessionClaims(pub SessionUser);

impl std::ops::Deref for SessionClaims {
    type Target = SessionUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for SessionClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req
            .extensions()
            .get::<SessionUser>()
            .cloned()
            .map(SessionClaims)
            .ok_or_else(|| ServerError::Unauthenticated("No valid session cookie was supplied.".to_string()));
        ready(claims)
    }
}

/// The httpOnly session cookie. `SameSite=Lax` keeps the cookie off cross-site POSTs; the
/// CSRF check covers the rest.
pub fn session_cookie(token: &str, ttl: Duration) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .finish()
}

/// The readable CSRF cookie. Clients echo its value back in the `x-csrf-token` header on
/// every state-changing request.
pub fn csrf_cookie(ttl: Duration) -> Cookie<'static> {
    let token: String = thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
    Cookie::build(CSRF_COOKIE, token)
        .path("/")
        .http_only(false)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .finish()
}

/// Expired replacements for both cookies, used on logout.
pub fn expired_cookies() -> (Cookie<'static>, Cookie<'static>) {
    let mut session = Cookie::build(SESSION_COOKIE, "").path("/").http_only(true).finish();
    session.make_removal();
    let mut csrf = Cookie::build(CSRF_COOKIE, "").path("/").finish();
    csrf.make_removal();
    (session, csrf)
}
