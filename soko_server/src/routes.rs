//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use paystack_tools::TransferEvent;
use soko_engine::{
    db_types::{NewBankAccount, NewDispute, NewOrder, OrderId, OtpPurpose, Role},
    dispute_objects::DisputeQueryFilter,
    order_objects::{OrderQueryFilter, OrderResult},
    payout_objects::PayoutQueryFilter,
    se_api::auth_api::OtpVerification,
    traits::{
        AccountManagement,
        AuthApiError,
        AuthManagement,
        DisputeManagement,
        OrderManagement,
        PayoutManagement,
        TransferGateway,
    },
    AccountApi,
    AuthApi,
    DisputeApi,
    OrderFlowApi,
    PayoutApi,
};

use crate::{
    auth::{csrf_cookie, expired_cookies, session_cookie, SessionClaims, ACTION_TOKEN_HEADER, SESSION_COOKIE},
    config::ServerOptions,
    data_objects::{
        AuditParams,
        CheckoutRequest,
        DisputeMessageRequest,
        ItemStatusRequest,
        JsonResponse,
        LoginRequest,
        LoginResponse,
        NewBankAccountRequest,
        NewDisputeRequest,
        NotificationParams,
        OtpVerifyRequest,
        PhoneRequest,
        ResolveDisputeRequest,
        SweepResponse,
        WithdrawalRequest,
    },
    errors::ServerError,
    integrations::paystack::event_payout_status,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
// The generic parameters are fixed: `B` is the storage backend, `G` the transfer gateway.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl [$($bounds:path),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>);}
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl [$($bounds:path),+] requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>);}
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl [$($bounds:path),+], [$($gbounds:path),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]<B, G>(core::marker::PhantomData<fn() -> (B, G)>);}
        paste::paste! { impl<B, G> [<$name:camel Route>]<B, G> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> (B, G)>)
            }
        }}
        paste::paste! { impl<B, G> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B, G>
        where
            B: $($bounds +)+ 'static,
            G: $($gbounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B, G>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl [$($bounds:path),+], [$($gbounds:path),+] requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]<B, G>(core::marker::PhantomData<fn() -> (B, G)>);}
        paste::paste! { impl<B, G> [<$name:camel Route>]<B, G> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> (B, G)>)
            }
        }}
        paste::paste! { impl<B, G> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B, G>
        where
            B: $($bounds +)+ 'static,
            G: $($gbounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B, G>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Auth  ----------------------------------------------------

route!(login => Post "/auth/login" impl [AuthManagement, AccountManagement]);
/// Route handler for the login endpoint
///
/// Checks the email/password pair against the stored argon2 hash and, on success, sets two
/// cookies: the httpOnly `session_token` and the readable `csrf_token` the client must echo
/// in the `x-csrf-token` header on state-changing calls. The response body carries the
/// session identity and its expiry.
pub async fn login<B>(body: web::Json<LoginRequest>, api: web::Data<AuthApi<B>>) -> Result<HttpResponse, ServerError>
where B: AuthManagement + AccountManagement {
    let LoginRequest { email, password } = body.into_inner();
    debug!("💻️ POST login");
    let session = api.login(&email, &password).await?;
    info!("💻️ {} logged in", session.user);
    let ttl = api.settings().session_ttl;
    let response = LoginResponse { user: session.user, expires_at: session.expires_at };
    Ok(HttpResponse::Ok().cookie(session_cookie(&session.token, ttl)).cookie(csrf_cookie(ttl)).json(response))
}

route!(logout => Post "/logout" impl [AuthManagement, AccountManagement]);
/// Destroys the server-side session and expires both cookies. Safe to call with a stale
/// cookie; the result is the same either way.
pub async fn logout<B>(req: HttpRequest, api: web::Data<AuthApi<B>>) -> Result<HttpResponse, ServerError>
where B: AuthManagement + AccountManagement {
    trace!("💻️ POST logout");
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        api.logout(cookie.value()).await?;
    }
    let (session, csrf) = expired_cookies();
    Ok(HttpResponse::Ok().cookie(session).cookie(csrf).json(JsonResponse::success("Logged out")))
}

//----------------------------------------------   Account  ----------------------------------------------------

route!(my_account => Get "/account" impl [AccountManagement]);
pub async fn my_account<B: AccountManagement>(
    claims: SessionClaims,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET account for {}", *claims);
    let user = api.profile(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

route!(notifications => Get "/notifications" impl [AccountManagement]);
pub async fn notifications<B: AccountManagement>(
    claims: SessionClaims,
    params: web::Query<NotificationParams>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET notifications for {}", *claims);
    let notifications = api.notifications(claims.user_id, params.unread_only).await?;
    Ok(HttpResponse::Ok().json(notifications))
}

route!(mark_notification_read => Post "/notifications/{id}/read" impl [AccountManagement]);
pub async fn mark_notification_read<B: AccountManagement>(
    claims: SessionClaims,
    path: web::Path<i64>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST notification {id} read for {}", *claims);
    let notification = api.mark_notification_read(claims.user_id, id).await?;
    Ok(HttpResponse::Ok().json(notification))
}

route!(request_phone_otp => Post "/account/phone/otp" impl [AuthManagement, AccountManagement]);
/// Issues a phone-verification code. Supplying a phone number in the body stores it (and
/// resets the verified flag) first; omitting it reuses the number on file. Subject to the
/// per-user reissue cooldown (429 on violation).
pub async fn request_phone_otp<B>(
    claims: SessionClaims,
    body: web::Json<PhoneRequest>,
    accounts: web::Data<AccountApi<B>>,
    auth: web::Data<AuthApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: AuthManagement + AccountManagement,
{
    debug!("💻️ POST phone OTP request for {}", *claims);
    if let Some(phone) = &body.phone {
        accounts.set_phone(claims.user_id, phone).await?;
    }
    let delivery = auth.request_otp(claims.user_id, OtpPurpose::VerifyPhone).await?;
    Ok(HttpResponse::Ok().json(delivery))
}

route!(verify_phone => Post "/account/phone/verify" impl [AuthManagement, AccountManagement]);
pub async fn verify_phone<B>(
    claims: SessionClaims,
    body: web::Json<OtpVerifyRequest>,
    auth: web::Data<AuthApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: AuthManagement + AccountManagement,
{
    debug!("💻️ POST phone verification for {}", *claims);
    match auth.verify_otp(claims.user_id, OtpPurpose::VerifyPhone, &body.code).await? {
        OtpVerification::PhoneVerified(user) => Ok(HttpResponse::Ok().json(user)),
        OtpVerification::ActionToken { .. } => {
            Err(ServerError::BackendError("A VerifyPhone code minted an action token".to_string()))
        },
    }
}

//----------------------------------------------   Orders  ----------------------------------------------------

route!(checkout => Post "/orders" impl [OrderManagement] requires [Role::Buyer]);
/// Places an order. The order id is minted server-side; the response carries the order and
/// its items, each attributed to its vendor.
pub async fn checkout<B: OrderManagement>(
    claims: SessionClaims,
    body: web::Json<CheckoutRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST checkout for {} with {} item(s)", *claims, request.items.len());
    let mut order = NewOrder::new(claims.user_id);
    if let Some(currency) = request.currency {
        order = order.with_currency(currency);
    }
    order.items = request.items;
    let (order, items) = api.place_order(claims.user_id, order).await?;
    Ok(HttpResponse::Ok().json(OrderResult::new(order, items)))
}

route!(my_orders => Get "/orders" impl [OrderManagement] requires [Role::Buyer]);
pub async fn my_orders<B: OrderManagement>(
    claims: SessionClaims,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders for {}", *claims);
    let orders = api.orders_for_buyer(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_by_id => Get "/orders/{order_id}" impl [OrderManagement] requires [Role::Buyer, Role::Vendor, Role::Admin]);
/// Fetches one order. Buyers see their own orders, vendors the orders they have items on
/// (filtered to those items), admins everything.
pub async fn order_by_id<B: OrderManagement>(
    claims: SessionClaims,
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order [{order_id}] for {}", *claims);
    let result = api.order_for_user(&order_id, &claims.0).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(confirm_receipt => Post "/orders/{order_id}/received" impl [OrderManagement] requires [Role::Buyer]);
/// The buyer confirms receipt ahead of the auto-completion sweep, completing the order and
/// releasing its funds.
pub async fn confirm_receipt<B: OrderManagement>(
    claims: SessionClaims,
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST receipt confirmation on [{order_id}] by {}", *claims);
    let order = api.confirm_receipt(claims.user_id, &order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Disputes  ----------------------------------------------------

route!(raise_dispute => Post "/disputes" impl [DisputeManagement] requires [Role::Buyer]);
/// Opens a dispute on a delivered order inside the dispute window. The order's funds freeze
/// until the dispute is settled. Multi-vendor orders must name the disputed line item.
pub async fn raise_dispute<B: DisputeManagement>(
    claims: SessionClaims,
    body: web::Json<NewDisputeRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST dispute on [{}] by {}", request.order_id, *claims);
    let mut dispute = NewDispute::new(request.order_id, request.reason);
    if let Some(item_id) = request.order_item_id {
        dispute = dispute.with_item(item_id);
    }
    let dispute = api.raise_dispute(&claims.0, dispute).await?;
    Ok(HttpResponse::Ok().json(dispute))
}

route!(my_disputes => Get "/disputes" impl [DisputeManagement] requires [Role::Buyer, Role::Vendor]);
pub async fn my_disputes<B: DisputeManagement>(
    claims: SessionClaims,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET disputes for {}", *claims);
    let disputes = api.disputes_for_user(&claims.0).await?;
    Ok(HttpResponse::Ok().json(disputes))
}

route!(dispute_by_id => Get "/disputes/{id}" impl [DisputeManagement] requires [Role::Buyer, Role::Vendor, Role::Admin]);
pub async fn dispute_by_id<B: DisputeManagement>(
    claims: SessionClaims,
    path: web::Path<i64>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ GET dispute #{id} for {}", *claims);
    let thread = api.dispute_for_user(id, &claims.0).await?;
    Ok(HttpResponse::Ok().json(thread))
}

route!(post_dispute_message => Post "/disputes/{id}/messages" impl [DisputeManagement] requires [Role::Buyer, Role::Vendor, Role::Admin]);
pub async fn post_dispute_message<B: DisputeManagement>(
    claims: SessionClaims,
    path: web::Path<i64>,
    body: web::Json<DisputeMessageRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST message on dispute #{id} by {}", *claims);
    let message = api.post_message(id, &claims.0, body.into_inner().body).await?;
    Ok(HttpResponse::Ok().json(message))
}

route!(close_dispute => Post "/disputes/{id}/close" impl [DisputeManagement] requires [Role::Buyer, Role::Admin]);
/// Withdraws (closes) an open dispute. Only the buyer who raised it, or an admin, may close
/// it; closing frees the order for settlement again.
pub async fn close_dispute<B: DisputeManagement>(
    claims: SessionClaims,
    path: web::Path<i64>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST close on dispute #{id} by {}", *claims);
    let dispute = api.close_dispute(&claims.0, id).await?;
    Ok(HttpResponse::Ok().json(dispute))
}

//----------------------------------------------   Vendor  ----------------------------------------------------

route!(vendor_orders => Get "/vendor/orders" impl [OrderManagement] requires [Role::Vendor]);
/// The vendor's slice of the order book: their line items across all orders.
pub async fn vendor_orders<B: OrderManagement>(
    claims: SessionClaims,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET vendor orders for {}", *claims);
    let items = api.items_for_vendor(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(items))
}

route!(update_item_status => Post "/vendor/items/{item_id}/status" impl [OrderManagement] requires [Role::Vendor]);
/// Advances one of the vendor's items through the fulfilment pipeline (forward-only). The
/// response includes the order so the client can see a derived status change, e.g. the
/// delivery that starts the buyer's confirmation clock.
pub async fn update_item_status<B: OrderManagement>(
    claims: SessionClaims,
    path: web::Path<i64>,
    body: web::Json<ItemStatusRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let item_id = path.into_inner();
    let status = body.status;
    debug!("💻️ POST item #{item_id} to {status} by {}", *claims);
    let update = api.update_item_status(claims.user_id, item_id, status).await?;
    Ok(HttpResponse::Ok().json(OrderResult::new(update.order, vec![update.item])))
}

route!(vendor_balance => Get "/vendor/balance" impl [PayoutManagement, AccountManagement], [TransferGateway] requires [Role::Vendor]);
pub async fn vendor_balance<B, G>(
    claims: SessionClaims,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    debug!("💻️ GET balance for {}", *claims);
    let balance = api.balance(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}

route!(payout_overview => Get "/vendor/payouts/overview" impl [PayoutManagement, AccountManagement], [TransferGateway] requires [Role::Vendor]);
pub async fn payout_overview<B, G>(
    claims: SessionClaims,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    debug!("💻️ GET payout overview for {}", *claims);
    let overview = api.overview(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(overview))
}

route!(vendor_payouts => Get "/vendor/payouts" impl [PayoutManagement, AccountManagement], [TransferGateway] requires [Role::Vendor]);
pub async fn vendor_payouts<B, G>(
    claims: SessionClaims,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    debug!("💻️ GET payouts for {}", *claims);
    let payouts = api.payouts_for_vendor(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(payouts))
}

route!(request_withdrawal => Post "/vendor/payouts" impl [PayoutManagement, AccountManagement], [TransferGateway] requires [Role::Vendor]);
/// Requests a withdrawal against the vendor's available balance. Validation (positive
/// amount, sufficient funds, verified phone, a registered destination) happens before any
/// provider call; a provider rejection lands the payout in `Failed` rather than rolling it
/// back.
pub async fn request_withdrawal<B, G>(
    claims: SessionClaims,
    body: web::Json<WithdrawalRequest>,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    let amount = body.amount;
    debug!("💻️ POST withdrawal of {amount} by {}", *claims);
    let payout = api.request_withdrawal(claims.user_id, amount).await?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(payout_by_id => Get "/vendor/payouts/{id}" impl [PayoutManagement, AccountManagement], [TransferGateway] requires [Role::Vendor, Role::Admin]);
pub async fn payout_by_id<B, G>(
    claims: SessionClaims,
    path: web::Path<i64>,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    let id = path.into_inner();
    debug!("💻️ GET payout #{id} for {}", *claims);
    let detail = api.payout_for_user(id, &claims.0).await?;
    Ok(HttpResponse::Ok().json(detail))
}

route!(cancel_my_payout => Post "/vendor/payouts/{id}/cancel" impl [PayoutManagement, AccountManagement], [TransferGateway] requires [Role::Vendor]);
/// Cancels one of the vendor's own payouts while it is still `Pending` or `Failed`. Anything
/// already handed to the provider must run its course.
pub async fn cancel_my_payout<B, G>(
    claims: SessionClaims,
    path: web::Path<i64>,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    let id = path.into_inner();
    debug!("💻️ POST cancel on payout #{id} by {}", *claims);
    let payout = api.cancel_payout(&claims.0, id).await?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(list_banks => Get "/vendor/banks" impl [TransferGateway] requires [Role::Vendor]);
/// The provider's bank directory, for populating the add-account form.
pub async fn list_banks<G: TransferGateway>(gateway: web::Data<G>) -> Result<HttpResponse, ServerError> {
    trace!("💻️ GET bank directory");
    let banks = gateway.list_banks().await?;
    Ok(HttpResponse::Ok().json(banks))
}

route!(bank_accounts => Get "/vendor/bank-accounts" impl [AccountManagement] requires [Role::Vendor]);
pub async fn bank_accounts<B: AccountManagement>(
    claims: SessionClaims,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET bank accounts for {}", *claims);
    let accounts = api.bank_accounts(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(accounts))
}

route!(add_bank_account => Post "/vendor/bank-accounts" impl [AuthManagement, AccountManagement], [TransferGateway] requires [Role::Vendor]);
/// Registers a payout destination. The caller must present the single-use `x-action-token`
/// minted by a `PayoutDestination` OTP. The account holder name comes from the provider's
/// resolution, not from the client, and the transfer recipient is registered before anything
/// is stored.
pub async fn add_bank_account<B, G>(
    claims: SessionClaims,
    req: HttpRequest,
    body: web::Json<NewBankAccountRequest>,
    accounts: web::Data<AccountApi<B>>,
    auth: web::Data<AuthApi<B>>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError>
where
    B: AuthManagement + AccountManagement,
    G: TransferGateway,
{
    let request = body.into_inner();
    debug!("💻️ POST bank account at {} for {}", request.bank_code, *claims);
    consume_action_token(&claims, &req, &auth).await?;
    let resolved = gateway.resolve_account(&request.bank_code, &request.account_number).await?;
    let recipient_code =
        gateway.register_recipient(&resolved.account_name, &request.bank_code, &request.account_number).await?;
    let mut account =
        NewBankAccount::new(request.bank_code, request.bank_name, request.account_number, resolved.account_name)
            .with_recipient_code(recipient_code);
    if request.make_primary {
        account = account.as_primary();
    }
    let account = accounts.add_bank_account(claims.user_id, account).await?;
    Ok(HttpResponse::Ok().json(account))
}

route!(set_primary_bank_account => Post "/vendor/bank-accounts/{id}/primary" impl [AuthManagement, AccountManagement] requires [Role::Vendor]);
/// Changes where payouts go, so it is gated by the same action token as adding an account.
pub async fn set_primary_bank_account<B>(
    claims: SessionClaims,
    req: HttpRequest,
    path: web::Path<i64>,
    accounts: web::Data<AccountApi<B>>,
    auth: web::Data<AuthApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: AuthManagement + AccountManagement,
{
    let id = path.into_inner();
    debug!("💻️ POST primary bank account #{id} for {}", *claims);
    consume_action_token(&claims, &req, &auth).await?;
    let account = accounts.set_primary_bank_account(claims.user_id, id).await?;
    Ok(HttpResponse::Ok().json(account))
}

route!(remove_bank_account => Delete "/vendor/bank-accounts/{id}" impl [AccountManagement] requires [Role::Vendor]);
pub async fn remove_bank_account<B: AccountManagement>(
    claims: SessionClaims,
    path: web::Path<i64>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ DELETE bank account #{id} for {}", *claims);
    let account = api.remove_bank_account(claims.user_id, id).await?;
    Ok(HttpResponse::Ok().json(account))
}

async fn consume_action_token<B>(
    claims: &SessionClaims,
    req: &HttpRequest,
    auth: &web::Data<AuthApi<B>>,
) -> Result<(), ServerError>
where
    B: AuthManagement + AccountManagement,
{
    let token = req
        .headers()
        .get(ACTION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthApiError::ActionTokenInvalid)?;
    auth.consume_action_token(claims.user_id, OtpPurpose::PayoutDestination, token).await?;
    Ok(())
}

route!(request_payout_otp => Post "/vendor/payout-otp" impl [AuthManagement, AccountManagement] requires [Role::Vendor]);
/// Issues a `PayoutDestination` code to the vendor's verified channel. Verifying it mints
/// the single-use action token the bank-account endpoints require.
pub async fn request_payout_otp<B>(
    claims: SessionClaims,
    auth: web::Data<AuthApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: AuthManagement + AccountManagement,
{
    debug!("💻️ POST payout OTP request for {}", *claims);
    let delivery = auth.request_otp(claims.user_id, OtpPurpose::PayoutDestination).await?;
    Ok(HttpResponse::Ok().json(delivery))
}

route!(verify_payout_otp => Post "/vendor/payout-otp/verify" impl [AuthManagement, AccountManagement] requires [Role::Vendor]);
pub async fn verify_payout_otp<B>(
    claims: SessionClaims,
    body: web::Json<OtpVerifyRequest>,
    auth: web::Data<AuthApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: AuthManagement + AccountManagement,
{
    debug!("💻️ POST payout OTP verification for {}", *claims);
    match auth.verify_otp(claims.user_id, OtpPurpose::PayoutDestination, &body.code).await? {
        OtpVerification::ActionToken { token, expires_at } => {
            Ok(HttpResponse::Ok().json(serde_json::json!({ "action_token": token, "expires_at": expires_at })))
        },
        OtpVerification::PhoneVerified(_) => {
            Err(ServerError::BackendError("A PayoutDestination code verified a phone".to_string()))
        },
    }
}

//----------------------------------------------   Admin  ----------------------------------------------------

route!(auto_complete => Post "/admin/orders/auto-complete" impl [OrderManagement] requires [Role::Admin]);
/// Runs the auto-completion sweep: every order delivered more than the grace period ago with
/// no live dispute completes and releases its funds. Idempotent; a second run right after
/// the first reports zero completions.
pub async fn auto_complete<B: OrderManagement>(
    claims: SessionClaims,
    options: web::Data<ServerOptions>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ POST auto-complete sweep by {}", *claims);
    let result = api.auto_complete_orders(options.auto_complete_grace).await?;
    let response = SweepResponse { completed_count: result.count(), order_ids: result.order_ids() };
    Ok(HttpResponse::Ok().json(response))
}

route!(admin_orders => Get "/admin/orders" impl [OrderManagement] requires [Role::Admin]);
pub async fn admin_orders<B: OrderManagement>(
    query: web::Query<OrderQueryFilter>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let query = query.into_inner();
    debug!("💻️ GET admin order search: {query}");
    let orders = api.search_orders(query).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(admin_payouts => Get "/admin/payouts" impl [PayoutManagement, AccountManagement], [TransferGateway] requires [Role::Admin]);
pub async fn admin_payouts<B, G>(
    query: web::Query<PayoutQueryFilter>,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    let query = query.into_inner();
    debug!("💻️ GET admin payout search: {query}");
    let payouts = api.search_payouts(query).await?;
    Ok(HttpResponse::Ok().json(payouts))
}

route!(retry_payout => Post "/admin/payouts/{id}/retry" impl [PayoutManagement, AccountManagement], [TransferGateway] requires [Role::Admin]);
/// Re-submits a failed payout under a fresh idempotency reference. The old reference stays
/// in the attempt history so a late webhook for it still reconciles.
pub async fn retry_payout<B, G>(
    claims: SessionClaims,
    path: web::Path<i64>,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    let id = path.into_inner();
    info!("💻️ POST retry on payout #{id} by {}", *claims);
    let payout = api.retry_payout(&claims.0, id).await?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(admin_cancel_payout => Post "/admin/payouts/{id}/cancel" impl [PayoutManagement, AccountManagement], [TransferGateway] requires [Role::Admin]);
pub async fn admin_cancel_payout<B, G>(
    claims: SessionClaims,
    path: web::Path<i64>,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    let id = path.into_inner();
    info!("💻️ POST admin cancel on payout #{id} by {}", *claims);
    let payout = api.cancel_payout(&claims.0, id).await?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(sync_payout => Post "/admin/payouts/{id}/sync" impl [PayoutManagement, AccountManagement], [TransferGateway] requires [Role::Admin]);
/// Polls the provider for an in-flight payout and reconciles any difference. The manual
/// escape hatch for a lost webhook.
pub async fn sync_payout<B, G>(
    claims: SessionClaims,
    path: web::Path<i64>,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    let id = path.into_inner();
    info!("💻️ POST provider sync on payout #{id} by {}", *claims);
    let payout = api.sync_with_provider(id).await?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(admin_disputes => Get "/admin/disputes" impl [DisputeManagement] requires [Role::Admin]);
pub async fn admin_disputes<B: DisputeManagement>(
    query: web::Query<DisputeQueryFilter>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let query = query.into_inner();
    debug!("💻️ GET admin dispute search: {query}");
    let disputes = api.search_disputes(query).await?;
    Ok(HttpResponse::Ok().json(disputes))
}

route!(resolve_dispute => Post "/admin/disputes/{id}/resolve" impl [DisputeManagement] requires [Role::Admin]);
/// Records the admin verdict on a dispute. The thread goes read-only and the order returns
/// to `Completed`, unfreezing its funds; the resolution text reaches both parties via the
/// settled-dispute hook.
pub async fn resolve_dispute<B: DisputeManagement>(
    claims: SessionClaims,
    path: web::Path<i64>,
    body: web::Json<ResolveDisputeRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    info!("💻️ POST resolution on dispute #{id} by {}", *claims);
    let dispute = api.resolve_dispute(&claims.0, id, body.into_inner().resolution).await?;
    Ok(HttpResponse::Ok().json(dispute))
}

route!(audit_log => Get "/admin/audit-log" impl [AccountManagement] requires [Role::Admin]);
pub async fn audit_log<B: AccountManagement>(
    params: web::Query<AuditParams>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let limit = params.limit.unwrap_or(200);
    trace!("💻️ GET audit log (limit {limit})");
    let entries = api.audit_log(limit).await?;
    Ok(HttpResponse::Ok().json(entries))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------

route!(paystack_webhook => Post "/paystack" impl [PayoutManagement, AccountManagement], [TransferGateway]);
/// Receives transfer status events from Paystack. The signature middleware has already
/// verified the body. Always answers 200: a non-2xx makes Paystack re-deliver, and a report
/// we cannot apply now (unknown reference, terminal payout) will not get better for being
/// re-sent.
pub async fn paystack_webhook<B, G>(body: web::Json<TransferEvent>, api: web::Data<PayoutApi<B, G>>) -> HttpResponse
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    let event = body.into_inner();
    debug!("💻️ Received Paystack webhook event {}", event.event);
    let Some(kind) = event.kind() else {
        trace!("💻️ Ignoring webhook event {}", event.event);
        return HttpResponse::Ok().json(JsonResponse::success("Event ignored"));
    };
    let status = event_payout_status(kind);
    match api.apply_provider_report(&event.data.reference, status, event.data.reason.clone()).await {
        Ok(payout) => HttpResponse::Ok().json(JsonResponse::success(format!("Payout #{} is {}", payout.id, payout.status))),
        Err(e) => {
            warn!("💻️ Could not apply provider report for {}: {e}", event.data.reference);
            HttpResponse::Ok().json(JsonResponse::failure(e))
        },
    }
}
