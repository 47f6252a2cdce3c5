mod acl;
mod csrf;
mod session;
mod webhook_sig;

pub use acl::{AclMiddlewareFactory, AclMiddlewareService};
pub use csrf::{CsrfMiddlewareFactory, CsrfMiddlewareService};
pub use session::{SessionMiddlewareFactory, SessionMiddlewareService};
pub use webhook_sig::{WebhookSignatureMiddlewareFactory, WebhookSignatureMiddlewareService};
