use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use soko_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    AccountApi,
    AuthApi,
    DisputeApi,
    OrderFlowApi,
    PayoutApi,
    SqliteDatabase,
};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    housekeeping::start_housekeeping_worker,
    integrations::{Notifier, PaystackGateway},
    middleware::{CsrfMiddlewareFactory, SessionMiddlewareFactory, WebhookSignatureMiddlewareFactory},
    routes::{
        health,
        AddBankAccountRoute,
        AdminCancelPayoutRoute,
        AdminDisputesRoute,
        AdminOrdersRoute,
        AdminPayoutsRoute,
        AuditLogRoute,
        AutoCompleteRoute,
        BankAccountsRoute,
        CancelMyPayoutRoute,
        CheckoutRoute,
        CloseDisputeRoute,
        ConfirmReceiptRoute,
        DisputeByIdRoute,
        ListBanksRoute,
        LoginRoute,
        LogoutRoute,
        MarkNotificationReadRoute,
        MyAccountRoute,
        MyDisputesRoute,
        MyOrdersRoute,
        NotificationsRoute,
        OrderByIdRoute,
        PaystackWebhookRoute,
        PayoutByIdRoute,
        PayoutOverviewRoute,
        PostDisputeMessageRoute,
        RaiseDisputeRoute,
        RemoveBankAccountRoute,
        RequestPayoutOtpRoute,
        RequestPhoneOtpRoute,
        RequestWithdrawalRoute,
        ResolveDisputeRoute,
        RetryPayoutRoute,
        SetPrimaryBankAccountRoute,
        SyncPayoutRoute,
        UpdateItemStatusRoute,
        VendorBalanceRoute,
        VendorOrdersRoute,
        VendorPayoutsRoute,
        VerifyPayoutOtpRoute,
        VerifyPhoneRoute,
    },
};

const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = PaystackGateway::new(config.paystack.clone())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let notifier = Notifier::new(config.notifier.clone(), db.clone())?;
    let handlers = EventHandlers::new(config.event_buffer_size, build_event_hooks(notifier));
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _housekeeping = start_housekeeping_worker(db.clone(), config.auth.as_otp_settings());
    let srv = create_server_instance(config, db, gateway, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Wires the engine's event stream into the notifier. Every hook is a fire-and-forget
/// future; a failed notification is logged by the notifier and never fails the request that
/// triggered it.
pub fn build_event_hooks(notifier: Notifier) -> EventHooks {
    let mut hooks = EventHooks::default();
    let n = notifier.clone();
    hooks.on_order_delivered(move |ev| {
        let n = n.clone();
        Box::pin(async move { n.order_delivered(ev).await })
    });
    let n = notifier.clone();
    hooks.on_dispute_opened(move |ev| {
        let n = n.clone();
        Box::pin(async move { n.dispute_opened(ev).await })
    });
    let n = notifier.clone();
    hooks.on_dispute_message(move |ev| {
        let n = n.clone();
        Box::pin(async move { n.dispute_message(ev).await })
    });
    let n = notifier.clone();
    hooks.on_dispute_settled(move |ev| {
        let n = n.clone();
        Box::pin(async move { n.dispute_settled(ev).await })
    });
    let n = notifier.clone();
    hooks.on_payout_updated(move |ev| {
        let n = n.clone();
        Box::pin(async move { n.payout_updated(ev).await })
    });
    let n = notifier;
    hooks.on_otp_issued(move |ev| {
        let n = n.clone();
        Box::pin(async move { n.otp_issued(ev).await })
    });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: PaystackGateway,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let options = ServerOptions::from_config(&config);
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let auth_api = AuthApi::new(db.clone(), config.auth.as_otp_settings(), producers.clone());
        let accounts_api = AccountApi::new(db.clone());
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let disputes_api = DisputeApi::new(db.clone(), options.dispute_window, producers.clone());
        let payouts_api = PayoutApi::new(db.clone(), gateway.clone(), options.fee_basis_points, producers.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("soko::access_log"))
            .wrap(CsrfMiddlewareFactory::new())
            .app_data(web::Data::new(auth_api))
            .app_data(web::Data::new(accounts_api))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(disputes_api))
            .app_data(web::Data::new(payouts_api))
            .app_data(web::Data::new(gateway.clone()))
            .app_data(web::Data::new(options));
        // Routes that require a session. Specific paths (overview, banks) must register
        // before their `{id}` siblings.
        let session_scope = web::scope("/api")
            .wrap(SessionMiddlewareFactory::<SqliteDatabase>::new())
            .service(LogoutRoute::<SqliteDatabase>::new())
            .service(MyAccountRoute::<SqliteDatabase>::new())
            .service(NotificationsRoute::<SqliteDatabase>::new())
            .service(MarkNotificationReadRoute::<SqliteDatabase>::new())
            .service(RequestPhoneOtpRoute::<SqliteDatabase>::new())
            .service(VerifyPhoneRoute::<SqliteDatabase>::new())
            .service(CheckoutRoute::<SqliteDatabase>::new())
            .service(MyOrdersRoute::<SqliteDatabase>::new())
            .service(OrderByIdRoute::<SqliteDatabase>::new())
            .service(ConfirmReceiptRoute::<SqliteDatabase>::new())
            .service(RaiseDisputeRoute::<SqliteDatabase>::new())
            .service(MyDisputesRoute::<SqliteDatabase>::new())
            .service(DisputeByIdRoute::<SqliteDatabase>::new())
            .service(PostDisputeMessageRoute::<SqliteDatabase>::new())
            .service(CloseDisputeRoute::<SqliteDatabase>::new())
            .service(VendorOrdersRoute::<SqliteDatabase>::new())
            .service(UpdateItemStatusRoute::<SqliteDatabase>::new())
            .service(VendorBalanceRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(PayoutOverviewRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(VendorPayoutsRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(RequestWithdrawalRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(PayoutByIdRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(CancelMyPayoutRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(ListBanksRoute::<PaystackGateway>::new())
            .service(BankAccountsRoute::<SqliteDatabase>::new())
            .service(AddBankAccountRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(SetPrimaryBankAccountRoute::<SqliteDatabase>::new())
            .service(RemoveBankAccountRoute::<SqliteDatabase>::new())
            .service(RequestPayoutOtpRoute::<SqliteDatabase>::new())
            .service(VerifyPayoutOtpRoute::<SqliteDatabase>::new())
            .service(AutoCompleteRoute::<SqliteDatabase>::new())
            .service(AdminOrdersRoute::<SqliteDatabase>::new())
            .service(AdminPayoutsRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(RetryPayoutRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(AdminCancelPayoutRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(SyncPayoutRoute::<SqliteDatabase, PaystackGateway>::new())
            .service(AdminDisputesRoute::<SqliteDatabase>::new())
            .service(ResolveDisputeRoute::<SqliteDatabase>::new())
            .service(AuditLogRoute::<SqliteDatabase>::new());
        let webhook_scope = web::scope("/webhook")
            .wrap(WebhookSignatureMiddlewareFactory::new(
                PAYSTACK_SIGNATURE_HEADER,
                config.paystack.webhook_secret.clone(),
                true,
            ))
            .service(PaystackWebhookRoute::<SqliteDatabase, PaystackGateway>::new());
        app.service(health)
            .service(LoginRoute::<SqliteDatabase>::new())
            .service(session_scope)
            .service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
