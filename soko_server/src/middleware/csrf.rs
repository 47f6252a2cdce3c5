//! Double-submit CSRF middleware.
//!
//! Login hands the client a readable `csrf_token` cookie alongside the httpOnly session
//! cookie. Scripts on the site can read the cookie and echo it in the `x-csrf-token` header;
//! a cross-site attacker can fire the cookies at us but cannot read them, so it cannot
//! produce the matching header. The two values are compared in constant time.
//!
//! Only state-changing methods are checked. Safe methods, the login endpoint (no session
//! yet), webhooks (signature-checked instead) and the health probe are exempt.

use std::rc::Rc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::*;
use subtle::ConstantTimeEq;

use crate::{auth::{CSRF_COOKIE, CSRF_HEADER}, errors::ServerError};

const EXEMPT_PREFIXES: [&str; 3] = ["/auth/login", "/webhook", "/health"];

pub struct CsrfMiddlewareFactory;

impl CsrfMiddlewareFactory {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}

impl<S, B> Transform<S, ServiceRequest> for CsrfMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = CsrfMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CsrfMiddlewareService { service: Rc::new(service) }))
    }
}

pub struct CsrfMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for CsrfMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            if !is_state_changing(req.method()) || is_exempt(req.path()) {
                return service.call(req).await;
            }
            let cookie = req.cookie(CSRF_COOKIE).map(|c| c.value().to_string());
            let header = req.headers().get(CSRF_HEADER).and_then(|v| v.to_str().ok()).map(|s| s.to_string());
            let matched = match (&cookie, &header) {
                (Some(c), Some(h)) => c.as_bytes().ct_eq(h.as_bytes()).into(),
                _ => false,
            };
            if matched {
                service.call(req).await
            } else {
                debug!("🔐️ CSRF check failed for {} {}", req.method(), req.path());
                Err(ServerError::CsrfCheckFailed.into())
            }
        })
    }
}

fn is_state_changing(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

fn is_exempt(path: &str) -> bool {
    EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}
