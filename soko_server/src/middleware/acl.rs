//! Access control middleware.
//!
//! Placed on individual routes by the `route!` macro. It reads the [`SessionUser`] the
//! session middleware stashed in the request extensions and checks the user's role against
//! the route's allow-list. Any one of the listed roles grants access. No claims means no
//! session, which is a 401; a session with the wrong role is a 403.

use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::{future::{ok, Ready}, Future};
use soko_engine::db_types::{Role, SessionUser};

use crate::errors::ServerError;

pub struct AclMiddlewareFactory {
    allowed_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(allowed_roles: &[Role]) -> Self {
        AclMiddlewareFactory { allowed_roles: allowed_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AclMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { allowed_roles: self.allowed_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    allowed_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let allowed_roles = self.allowed_roles.clone();
        Box::pin(async move {
            let user = req.extensions().get::<SessionUser>().cloned().ok_or_else(|| {
                log::debug!("🔑️ No session claims found for a role-gated route");
                ServerError::Unauthenticated("No valid session cookie was supplied.".to_string())
            })?;
            if allowed_roles.iter().any(|role| user.role == *role) {
                service.call(req).await
            } else {
                log::debug!("🔑️ {user} may not access {}", req.path());
                Err(ServerError::InsufficientPermissions(format!(
                    "This endpoint is not available to {}s.",
                    user.role
                ))
                .into())
            }
        })
    }
}
