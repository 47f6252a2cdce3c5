//! Session resolution middleware.
//!
//! Wraps the `/api` scope. It reads the `session_token` cookie, asks the
//! [`AuthApi`](soko_engine::AuthApi) to resolve it (digest lookup against the sessions
//! table), and stores the resulting [`SessionUser`] in the request extensions for the
//! [`SessionClaims`](crate::auth::SessionClaims) extractor and the ACL middleware.
//!
//! A missing or stale cookie is not an error here; the request simply proceeds without
//! claims and fails later with a 401 if the handler requires them.

use std::{marker::PhantomData, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web,
    Error,
    HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::*;
use soko_engine::{traits::{AccountManagement, AuthManagement}, AuthApi};

use crate::auth::SESSION_COOKIE;

pub struct SessionMiddlewareFactory<B> {
    _backend: PhantomData<fn() -> B>,
}

impl<B> SessionMiddlewareFactory<B> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self { _backend: PhantomData }
    }
}

impl<S, B, R> Transform<S, ServiceRequest> for SessionMiddlewareFactory<B>
where
    S: Service<ServiceRequest, Response = ServiceResponse<R>, Error = Error> + 'static,
    S::Future: 'static,
    B: AuthManagement + AccountManagement + 'static,
    R: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<R>;
    type Transform = SessionMiddlewareService<S, B>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionMiddlewareService { service: Rc::new(service), _backend: PhantomData }))
    }
}

pub struct SessionMiddlewareService<S, B> {
    service: Rc<S>,
    _backend: PhantomData<fn() -> B>,
}

impl<S, B, R> Service<ServiceRequest> for SessionMiddlewareService<S, B>
where
    S: Service<ServiceRequest, Response = ServiceResponse<R>, Error = Error> + 'static,
    S::Future: 'static,
    B: AuthManagement + AccountManagement + 'static,
    R: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<R>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let token = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());
            if let Some(token) = token {
                match req.app_data::<web::Data<AuthApi<B>>>() {
                    Some(api) => match api.session_user(&token).await {
                        Ok(Some(user)) => {
                            trace!("🔑️ Session resolved for {user}");
                            req.extensions_mut().insert(user);
                        },
                        Ok(None) => trace!("🔑️ Session cookie did not match an active session"),
                        Err(e) => warn!("🔑️ Could not resolve session: {e}"),
                    },
                    None => error!("🔑️ AuthApi is not registered in app data. Sessions cannot be resolved."),
                }
            }
            service.call(req).await
        })
    }
}
