//! Webhook signature middleware.
//!
//! Paystack signs every webhook delivery with HMAC-SHA512 over the raw body, keyed with the
//! account secret, and puts the hex digest in the `x-paystack-signature` header. This
//! middleware recomputes the digest, compares it in constant time, and re-injects the body
//! so the handler can still deserialize it.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorForbidden},
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use soko_common::Secret;
use subtle::ConstantTimeEq;

use crate::helpers::paystack_signature;

pub struct WebhookSignatureMiddlewareFactory {
    signature_header: String,
    key: Secret<String>,
    // If false, then the middleware will not check the signature and always allow the call
    enabled: bool,
}

impl WebhookSignatureMiddlewareFactory {
    pub fn new(signature_header: &str, key: Secret<String>, enabled: bool) -> Self {
        WebhookSignatureMiddlewareFactory { signature_header: signature_header.into(), key, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for WebhookSignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = WebhookSignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(WebhookSignatureMiddlewareService {
            signature_header: self.signature_header.clone(),
            key: self.key.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct WebhookSignatureMiddlewareService<S> {
    signature_header: String,
    key: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for WebhookSignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.reveal().clone();
        let signature_header = self.signature_header.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature for request");
            if !enabled {
                trace!("🔐️ Webhook signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let expected = paystack_signature(&secret, data.as_ref());
            let provided = req
                .headers()
                .get(&signature_header)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    warn!("🔐️ No signature found in webhook request. Denying access.");
                    ErrorForbidden("No webhook signature found.")
                })?;
            let validated: bool = provided.as_bytes().ct_eq(expected.as_bytes()).into();
            if validated {
                trace!("🔐️ Webhook signature check ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid signature on webhook request. Denying access.");
                Err(ErrorForbidden("Invalid webhook signature."))
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
